//! Writer counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a writer's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Entries accepted by `commit`.
    pub committed: u64,
    /// Flushes attempted.
    pub flushes: u64,
    /// Entries in successful flushes.
    pub entries_flushed: u64,
    /// Flushes that failed.
    pub failed_batches: u64,
    /// Entries in failed flushes.
    pub entries_dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsInner {
    committed: AtomicU64,
    flushes: AtomicU64,
    entries_flushed: AtomicU64,
    failed_batches: AtomicU64,
    entries_dropped: AtomicU64,
}

impl StatsInner {
    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, entries: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.entries_flushed
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, entries: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.entries_dropped
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BatchStats {
        BatchStats {
            committed: self.committed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            entries_flushed: self.entries_flushed.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
        }
    }
}
