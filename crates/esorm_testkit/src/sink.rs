//! Recording bulk sink for batched writer tests.

use esorm_batch::BulkSink;
use esorm_gateway::{BackendError, GatewayError, GatewayResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One flush seen by a [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct Flush {
    /// Entry count reported by the writer.
    pub entries: usize,
    /// The NDJSON body.
    pub body: Vec<u8>,
    /// When the flush arrived.
    pub at: Instant,
}

impl Flush {
    /// Decodes the source lines (every second line) of the body.
    pub fn sources(&self) -> Vec<Value> {
        self.lines().into_iter().skip(1).step_by(2).collect()
    }

    /// Decodes the action lines of the body.
    pub fn actions(&self) -> Vec<Value> {
        self.lines().into_iter().step_by(2).collect()
    }

    fn lines(&self) -> Vec<Value> {
        String::from_utf8_lossy(&self.body)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

/// A [`BulkSink`] that records every flush instead of sending it.
///
/// Can be switched to failing mode, and can be slowed down to exercise
/// backpressure.
#[derive(Debug, Default)]
pub struct RecordingSink {
    flushes: Mutex<Vec<Flush>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingSink {
    /// Creates a sink that accepts every flush.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes later flushes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every later flush take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Flushes recorded so far, failed ones included.
    pub fn flushes(&self) -> Vec<Flush> {
        self.flushes.lock().clone()
    }

    /// Number of flushes recorded.
    pub fn flush_count(&self) -> usize {
        self.flushes.lock().len()
    }

    /// Total entries over every recorded flush.
    pub fn entry_total(&self) -> usize {
        self.flushes.lock().iter().map(|flush| flush.entries).sum()
    }

    /// Source documents of every flush, in flush order.
    pub fn sources(&self) -> Vec<Value> {
        self.flushes
            .lock()
            .iter()
            .flat_map(Flush::sources)
            .collect()
    }
}

impl BulkSink for RecordingSink {
    fn send_bulk(&self, body: &[u8], entries: usize) -> GatewayResult<()> {
        let failing = self.failing.load(Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.flushes.lock().push(Flush {
            entries,
            body: body.to_vec(),
            at: Instant::now(),
        });
        if failing {
            return Err(GatewayError::Backend(BackendError::new(
                503,
                "unavailable_shards_exception",
                "primary shard is not active",
                "",
            )));
        }
        Ok(())
    }
}
