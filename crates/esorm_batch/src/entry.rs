//! Buffered entries.

/// One pre-serialized document bound for an index.
///
/// `body` must be a single line of JSON. The writer owns the entry once it
/// is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Target index.
    pub index: String,
    /// Serialized document.
    pub body: Vec<u8>,
}

impl BatchEntry {
    /// Creates an entry.
    pub fn new(index: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            index: index.into(),
            body: body.into(),
        }
    }
}
