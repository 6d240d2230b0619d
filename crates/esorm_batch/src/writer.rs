//! The batched writer and its flush loop.

use crate::config::BatchConfig;
use crate::entry::BatchEntry;
use crate::error::{BatchError, BatchResult};
use crate::sink::{BulkSink, FailedBatch, FailureHook};
use crate::stats::{BatchStats, StatsInner};
use esorm_gateway::BulkBody;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

enum Lifecycle {
    /// Created; commits are buffered but nothing flushes yet.
    Idle(mpsc::Receiver<BatchEntry>),
    /// The flush loop is running.
    Running {
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Buffers pre-serialized documents and writes them in bulk.
///
/// A batch is flushed when it reaches `bulk_size` entries or when the flush
/// interval elapses, whichever comes first. Producers wait while the buffer
/// is full. A failed flush is logged, passed to the failure hook if one is
/// set, and dropped; it is never retried.
///
/// # Lifecycle
///
/// ```text
/// new() ──► idle ──start()──► running ──stop()──► stopped
///            │                                      ▲
///            └────────────────stop()────────────────┘
/// ```
///
/// `stop` flushes everything buffered before returning. Dropping a running
/// writer also drains and flushes in the background.
pub struct BatchWriter {
    config: BatchConfig,
    sink: Arc<dyn BulkSink>,
    hook: Option<FailureHook>,
    sender: RwLock<Option<mpsc::Sender<BatchEntry>>>,
    lifecycle: Mutex<Lifecycle>,
    started: AtomicBool,
    idle_warned: AtomicBool,
    stats: Arc<StatsInner>,
}

impl BatchWriter {
    /// Creates an idle writer.
    pub fn new(config: BatchConfig, sink: Arc<dyn BulkSink>) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity());
        Self {
            config,
            sink,
            hook: None,
            sender: RwLock::new(Some(tx)),
            lifecycle: Mutex::new(Lifecycle::Idle(rx)),
            started: AtomicBool::new(false),
            idle_warned: AtomicBool::new(false),
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Sets a callback receiving every batch whose flush failed.
    #[must_use]
    pub fn with_failure_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(FailedBatch) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Starts the flush loop on the current tokio runtime.
    ///
    /// Calling it again while running does nothing.
    pub fn start(&self) -> BatchResult<()> {
        let runtime = Handle::try_current().map_err(|_| BatchError::NoRuntime)?;

        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(rx) => {
                let (shutdown, shutdown_rx) = oneshot::channel();
                let flusher = self.flusher();
                let config = self.config.clone();
                let handle = runtime.spawn(run(rx, shutdown_rx, flusher, config));
                *lifecycle = Lifecycle::Running { shutdown, handle };
                self.started.store(true, Ordering::Release);
                info!(
                    bulk_size = self.config.threshold(),
                    interval_ms = self.config.period().as_millis() as u64,
                    "batch writer started"
                );
                Ok(())
            }
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                Ok(())
            }
            Lifecycle::Stopped => Err(BatchError::Closed),
        }
    }

    /// Returns true while the flush loop runs.
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running { .. })
    }

    /// Stops accepting entries, flushes everything buffered and waits for
    /// the flush loop to end. Later calls do nothing.
    pub async fn stop(&self) -> BatchResult<()> {
        self.sender.write().take();
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);

        match previous {
            Lifecycle::Running { shutdown, handle } => {
                let _ = shutdown.send(());
                handle
                    .await
                    .map_err(|err| BatchError::Join(err.to_string()))?;
            }
            Lifecycle::Idle(rx) => {
                drain(rx, self.flusher(), self.config.threshold()).await;
            }
            Lifecycle::Stopped => {}
        }
        debug!("batch writer stopped");
        Ok(())
    }

    fn sender(&self) -> BatchResult<mpsc::Sender<BatchEntry>> {
        self.sender.read().clone().ok_or(BatchError::Closed)
    }

    /// Buffers an entry, waiting while the buffer is full.
    ///
    /// Until [`start`](Self::start) is called nothing drains the buffer, so
    /// once it fills this waits until the writer is started or stopped. The
    /// first commit made before `start` logs a warning.
    pub async fn commit(
        &self,
        index: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> BatchResult<()> {
        let sender = self.sender()?;
        self.warn_if_idle();
        sender
            .send(BatchEntry::new(index, body))
            .await
            .map_err(|_| BatchError::Closed)?;
        self.committed(&sender);
        Ok(())
    }

    /// Buffers an entry from synchronous code, blocking while the buffer is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context;
    /// use [`commit`](Self::commit) there.
    pub fn blocking_commit(
        &self,
        index: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> BatchResult<()> {
        let sender = self.sender()?;
        self.warn_if_idle();
        sender
            .blocking_send(BatchEntry::new(index, body))
            .map_err(|_| BatchError::Closed)?;
        self.committed(&sender);
        Ok(())
    }

    fn warn_if_idle(&self) {
        if !self.started.load(Ordering::Acquire)
            && !self.idle_warned.swap(true, Ordering::Relaxed)
        {
            warn!("batch writer not started, commits are only buffered until start()");
        }
    }

    fn committed(&self, sender: &mpsc::Sender<BatchEntry>) {
        self.stats.record_commit();
        let buffered = sender.max_capacity() - sender.capacity();
        if buffered > sender.max_capacity() / 2 {
            info!("commit data to es, buffered entries: {}", buffered);
        }
    }

    /// Returns the number of entries waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, |sender| sender.max_capacity() - sender.capacity())
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> BatchStats {
        self.stats.snapshot()
    }

    fn flusher(&self) -> Flusher {
        Flusher {
            sink: Arc::clone(&self.sink),
            hook: self.hook.clone(),
            stats: Arc::clone(&self.stats),
            warn_time: self.config.warn_time,
        }
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        self.sender.get_mut().take();
        match std::mem::replace(self.lifecycle.get_mut(), Lifecycle::Stopped) {
            // The loop drains and flushes once it sees the shutdown signal.
            Lifecycle::Running { shutdown, .. } => {
                let _ = shutdown.send(());
            }
            Lifecycle::Idle(mut rx) => {
                let mut batch = Vec::new();
                while let Ok(entry) = rx.try_recv() {
                    batch.push(entry);
                }
                if batch.is_empty() {
                    return;
                }
                let flusher = self.flusher();
                match Handle::try_current() {
                    Ok(runtime) => {
                        runtime.spawn(async move {
                            flusher.flush(&mut batch, Vec::new()).await;
                        });
                    }
                    Err(_) => flusher.flush_blocking(&mut batch, Vec::new()),
                }
            }
            Lifecycle::Stopped => {}
        }
    }
}

/// Flush loop: runs until shutdown, then drains and flushes the rest.
async fn run(
    mut rx: mpsc::Receiver<BatchEntry>,
    mut shutdown: oneshot::Receiver<()>,
    flusher: Flusher,
    config: BatchConfig,
) {
    let threshold = config.threshold();
    let period = config.period();
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut batch = Vec::with_capacity(threshold.min(1024));
    let mut buf = Vec::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            entry = rx.recv() => match entry {
                Some(entry) => {
                    batch.push(entry);
                    if batch.len() >= threshold {
                        buf = flusher.flush(&mut batch, buf).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                buf = flusher.flush(&mut batch, buf).await;
            }
        }
    }

    rx.close();
    while let Some(entry) = rx.recv().await {
        batch.push(entry);
        if batch.len() >= threshold {
            buf = flusher.flush(&mut batch, buf).await;
        }
    }
    flusher.flush(&mut batch, buf).await;
}

/// Flushes whatever an idle writer buffered.
async fn drain(mut rx: mpsc::Receiver<BatchEntry>, flusher: Flusher, threshold: usize) {
    rx.close();
    let mut batch = Vec::new();
    let mut buf = Vec::new();
    while let Some(entry) = rx.recv().await {
        batch.push(entry);
        if batch.len() >= threshold {
            buf = flusher.flush(&mut batch, buf).await;
        }
    }
    flusher.flush(&mut batch, buf).await;
}

struct Flusher {
    sink: Arc<dyn BulkSink>,
    hook: Option<FailureHook>,
    stats: Arc<StatsInner>,
    warn_time: std::time::Duration,
}

impl Flusher {
    /// Encodes `batch` into `buf` and clears the batch. Entries whose index
    /// cannot be encoded are logged and skipped.
    fn encode(batch: &mut Vec<BatchEntry>, buf: Vec<u8>) -> (BulkBody, usize) {
        let mut body = BulkBody::reuse(buf);
        for entry in batch.drain(..) {
            if let Err(err) = body.raw(&entry.index, &entry.body) {
                error!(index = %entry.index, "dropping unencodable entry: {}", err);
            }
        }
        let entries = body.len();
        (body, entries)
    }

    /// Sends the batch on a blocking thread and returns the buffer for
    /// reuse.
    async fn flush(&self, batch: &mut Vec<BatchEntry>, buf: Vec<u8>) -> Vec<u8> {
        if batch.is_empty() {
            return buf;
        }
        let (body, entries) = Self::encode(batch, buf);
        let body = body.into_bytes();

        let sink = Arc::clone(&self.sink);
        let started = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || {
            let result = sink.send_bulk(&body, entries);
            (body, result)
        })
        .await;

        match outcome {
            Ok((body, result)) => {
                self.finish(entries, &body, result, started);
                body
            }
            Err(err) => {
                error!("bulk flush task failed: {}", err);
                self.stats.record_failure(entries);
                Vec::new()
            }
        }
    }

    /// Sends the batch on the current thread.
    fn flush_blocking(&self, batch: &mut Vec<BatchEntry>, buf: Vec<u8>) {
        if batch.is_empty() {
            return;
        }
        let (body, entries) = Self::encode(batch, buf);
        let started = Instant::now();
        let result = self.sink.send_bulk(body.as_bytes(), entries);
        self.finish(entries, body.as_bytes(), result, started);
    }

    fn finish(
        &self,
        entries: usize,
        body: &[u8],
        result: esorm_gateway::GatewayResult<()>,
        started: Instant,
    ) {
        let elapsed = started.elapsed();
        if !self.warn_time.is_zero() && elapsed > self.warn_time {
            warn!("save data to es use time: {} ms", elapsed.as_millis());
        }

        match result {
            Ok(()) => {
                self.stats.record_flush(entries);
                debug!(entries, elapsed_ms = elapsed.as_millis() as u64, "bulk flush done");
            }
            Err(err) => {
                self.stats.record_failure(entries);
                error!(entries, "bulk flush failed, batch dropped: {}", err);
                if let Some(hook) = &self.hook {
                    hook(FailedBatch {
                        entries,
                        body: body.to_vec(),
                        error: err,
                    });
                }
            }
        }
    }
}
