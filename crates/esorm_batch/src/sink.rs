//! Bulk flush targets.

use esorm_gateway::{Gateway, GatewayError, GatewayResult};
use std::fmt;
use std::sync::Arc;

/// Receives the NDJSON body of each flush.
///
/// Called from a blocking thread, so implementations may do blocking I/O.
///
/// # Implementors
///
/// - [`Gateway`] - sends the body as one bulk request
/// - `esorm_testkit::RecordingSink` - records flushes for tests
pub trait BulkSink: Send + Sync + 'static {
    /// Sends one batch of `entries` entries.
    fn send_bulk(&self, body: &[u8], entries: usize) -> GatewayResult<()>;
}

impl BulkSink for Gateway {
    /// Any failed item fails the whole batch, so the failure hook sees the
    /// complete body.
    fn send_bulk(&self, body: &[u8], _entries: usize) -> GatewayResult<()> {
        let response = self.bulk(body)?;
        match response.first_error() {
            Some(err) => Err(GatewayError::Backend(err.clone())),
            None => Ok(()),
        }
    }
}

/// A batch whose flush failed.
pub struct FailedBatch {
    /// Number of entries in the batch.
    pub entries: usize,
    /// The NDJSON body that was sent.
    pub body: Vec<u8>,
    /// Why the flush failed.
    pub error: GatewayError,
}

impl fmt::Debug for FailedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailedBatch")
            .field("entries", &self.entries)
            .field("bytes", &self.body.len())
            .field("error", &self.error)
            .finish()
    }
}

/// Dead-letter callback for failed flushes.
pub type FailureHook = Arc<dyn Fn(FailedBatch) + Send + Sync>;
