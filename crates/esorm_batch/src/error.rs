//! Error types for the batched writer.

use thiserror::Error;

/// Result type for batched writer operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// Errors returned to producers and lifecycle callers.
///
/// Flush failures are not among them: a failed bulk call is logged and
/// handed to the failure hook, never reported back to producers.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The writer was stopped; no further entries are accepted.
    #[error("batch writer is closed")]
    Closed,

    /// `start` was called outside a tokio runtime.
    #[error("batch writer requires a tokio runtime")]
    NoRuntime,

    /// The flush loop ended abnormally.
    #[error("flush loop failed: {0}")]
    Join(String),
}
