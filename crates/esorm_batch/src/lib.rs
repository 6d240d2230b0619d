//! # esorm Batch
//!
//! Asynchronous batched writer for high-volume telemetry.
//!
//! This crate provides:
//! - [`BatchWriter`], a bounded buffer of pre-serialized documents flushed
//!   as bulk requests by size or by time
//! - The [`BulkSink`] seam, implemented for the gateway
//! - A dead-letter [`FailureHook`] for batches whose flush failed
//! - Writer counters ([`BatchStats`])
//!
//! ## Architecture
//!
//! Producers hand entries to a bounded channel. One flush task owns the
//! receiving end, accumulates up to `bulk_size` entries and sends each batch
//! from a blocking thread, since the gateway performs blocking HTTP.
//!
//! ```text
//! commit() ──► mpsc (buffer_size) ──► flush task ──► spawn_blocking ──► BulkSink
//!                                         ▲
//!                                    interval tick
//! ```
//!
//! ## Key Invariants
//!
//! - A batch never holds more than `bulk_size` entries
//! - Entries are flushed in commit order
//! - `stop` returns only after every accepted entry was flushed or dropped
//! - Failed batches are never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entry;
mod error;
mod sink;
mod stats;
mod writer;

pub use config::BatchConfig;
pub use entry::BatchEntry;
pub use error::{BatchError, BatchResult};
pub use sink::{BulkSink, FailedBatch, FailureHook};
pub use stats::BatchStats;
pub use writer::BatchWriter;
