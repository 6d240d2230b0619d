//! Integration tests for the batched writer.

use esorm_batch::{BatchConfig, BatchError, BatchWriter, FailedBatch};
use esorm_gateway::EsConfig;
use esorm_testkit::{MemoryBackend, RecordingSink};
use parking_lot::Mutex;
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Duration;

const INDEX: &str = "goiot-device-log";

fn doc(n: usize) -> Vec<u8> {
    json!({ "seq": n, "deviceId": "d1" }).to_string().into_bytes()
}

/// Polls `condition` until it holds or two seconds pass.
async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn seqs(sink: &RecordingSink) -> Vec<u64> {
    sink.sources()
        .iter()
        .map(|source| source["seq"].as_u64().unwrap())
        .collect()
}

#[tokio::test]
async fn flushes_when_bulk_size_is_reached() {
    let sink = RecordingSink::new();
    let config = BatchConfig::new()
        .with_bulk_size(3)
        .with_flush_interval(Duration::from_secs(60));
    let writer = BatchWriter::new(config, sink.clone());
    writer.start().unwrap();

    for n in 0..7 {
        writer.commit(INDEX, doc(n)).await.unwrap();
    }
    wait_for(|| sink.flush_count() == 2).await;
    writer.stop().await.unwrap();

    let sizes: Vec<usize> = sink.flushes().iter().map(|f| f.entries).collect();
    assert_eq!(sizes, [3, 3, 1]);
    assert_eq!(seqs(&sink), (0..7).collect::<Vec<_>>());

    let stats = writer.stats();
    assert_eq!(stats.committed, 7);
    assert_eq!(stats.flushes, 3);
    assert_eq!(stats.entries_flushed, 7);
    assert_eq!(stats.failed_batches, 0);
}

#[tokio::test]
async fn flushes_when_interval_elapses() {
    let sink = RecordingSink::new();
    let config = BatchConfig::new()
        .with_bulk_size(1000)
        .with_flush_interval(Duration::from_millis(50));
    let writer = BatchWriter::new(config, sink.clone());
    writer.start().unwrap();

    writer.commit(INDEX, doc(1)).await.unwrap();
    writer.commit(INDEX, doc(2)).await.unwrap();
    wait_for(|| sink.flush_count() == 1).await;

    let flush = &sink.flushes()[0];
    assert_eq!(flush.entries, 2);
    assert_eq!(flush.actions()[0], json!({ "index": { "_index": INDEX } }));

    writer.stop().await.unwrap();
    assert_eq!(sink.flush_count(), 1);
}

#[tokio::test]
async fn empty_ticks_do_not_flush() {
    let sink = RecordingSink::new();
    let config = BatchConfig::new().with_flush_interval(Duration::from_millis(10));
    let writer = BatchWriter::new(config, sink.clone());
    writer.start().unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    writer.stop().await.unwrap();
    assert_eq!(sink.flush_count(), 0);
}

#[tokio::test]
async fn stop_drains_an_idle_writer() {
    let sink = RecordingSink::new();
    let writer = BatchWriter::new(BatchConfig::new().with_bulk_size(2), sink.clone());

    for n in 0..5 {
        writer.commit(INDEX, doc(n)).await.unwrap();
    }
    assert_eq!(writer.buffered(), 5);
    assert_eq!(sink.flush_count(), 0);

    writer.stop().await.unwrap();
    let sizes: Vec<usize> = sink.flushes().iter().map(|f| f.entries).collect();
    assert_eq!(sizes, [2, 2, 1]);
    assert_eq!(seqs(&sink), [0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn commits_fail_after_stop() {
    let sink = RecordingSink::new();
    let writer = BatchWriter::new(BatchConfig::new(), sink.clone());
    writer.start().unwrap();
    writer.start().unwrap();
    assert!(writer.is_running());

    writer.stop().await.unwrap();
    writer.stop().await.unwrap();
    assert!(!writer.is_running());

    assert!(matches!(
        writer.commit(INDEX, doc(1)).await,
        Err(BatchError::Closed)
    ));
    assert!(matches!(writer.start(), Err(BatchError::Closed)));
    assert_eq!(writer.buffered(), 0);
}

/// Log output collected by a test subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn commits_before_start_warn_once() {
    let logs = CapturedLogs::default();
    let writer_logs = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer_logs.clone())
        .finish();

    let sink = RecordingSink::new();
    let writer = BatchWriter::new(BatchConfig::new(), sink.clone());
    tracing::subscriber::with_default(subscriber, || {
        for n in 0..3 {
            writer.blocking_commit(INDEX, doc(n)).unwrap();
        }
    });

    assert_eq!(writer.buffered(), 3);
    assert_eq!(logs.text().matches("batch writer not started").count(), 1);

    drop(writer);
    assert_eq!(sink.entry_total(), 3);
}

#[test]
fn start_requires_a_runtime() {
    let writer = BatchWriter::new(BatchConfig::new(), RecordingSink::new());
    assert!(matches!(writer.start(), Err(BatchError::NoRuntime)));
}

#[tokio::test]
async fn failed_batches_reach_the_hook() {
    let sink = RecordingSink::new();
    sink.set_failing(true);
    let failed: Arc<Mutex<Vec<FailedBatch>>> = Arc::default();
    let seen = Arc::clone(&failed);

    let writer = BatchWriter::new(BatchConfig::new().with_bulk_size(2), sink.clone())
        .with_failure_hook(move |batch| seen.lock().push(batch));
    writer.start().unwrap();
    for n in 0..3 {
        writer.commit(INDEX, doc(n)).await.unwrap();
    }
    writer.stop().await.unwrap();

    let failed = failed.lock();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].entries, 2);
    assert_eq!(failed[1].entries, 1);
    assert_eq!(failed[0].error.backend().unwrap().status, 503);
    let body = String::from_utf8(failed[1].body.clone()).unwrap();
    assert!(body.contains(r#""seq":2"#));

    let stats = writer.stats();
    assert_eq!(stats.failed_batches, 2);
    assert_eq!(stats.entries_dropped, 3);
    assert_eq!(stats.entries_flushed, 0);
}

#[tokio::test]
async fn failures_do_not_stop_the_loop() {
    let sink = RecordingSink::new();
    sink.set_failing(true);
    let writer = BatchWriter::new(BatchConfig::new().with_bulk_size(1), sink.clone());
    writer.start().unwrap();

    writer.commit(INDEX, doc(1)).await.unwrap();
    wait_for(|| sink.flush_count() == 1).await;
    sink.set_failing(false);
    writer.commit(INDEX, doc(2)).await.unwrap();
    writer.stop().await.unwrap();

    let stats = writer.stats();
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.entries_flushed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_buffer_applies_backpressure() {
    let sink = RecordingSink::new();
    sink.set_delay(Duration::from_millis(20));
    let config = BatchConfig::new()
        .with_buffer_size(2)
        .with_bulk_size(1)
        .with_flush_interval(Duration::from_secs(60));
    let writer = Arc::new(BatchWriter::new(config, sink.clone()));
    writer.start().unwrap();

    let producer = {
        let writer = Arc::clone(&writer);
        tokio::spawn(async move {
            for n in 0..8 {
                writer.commit(INDEX, doc(n)).await.unwrap();
                assert!(writer.buffered() <= 2);
            }
        })
    };
    producer.await.unwrap();
    writer.stop().await.unwrap();

    assert_eq!(sink.flush_count(), 8);
    assert_eq!(seqs(&sink), (0..8).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_producers() {
    let sink = RecordingSink::new();
    let writer = Arc::new(BatchWriter::new(BatchConfig::new().with_bulk_size(10), sink.clone()));
    writer.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let writer = Arc::clone(&writer);
            tokio::task::spawn_blocking(move || {
                for n in 0..25 {
                    writer.blocking_commit(INDEX, doc(worker * 100 + n)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    writer.stop().await.unwrap();

    assert_eq!(sink.entry_total(), 100);
    assert!(sink.flushes().iter().all(|flush| flush.entries <= 10));
}

#[tokio::test]
async fn dropping_a_running_writer_flushes() {
    let sink = RecordingSink::new();
    let writer = BatchWriter::new(
        BatchConfig::new().with_flush_interval(Duration::from_secs(60)),
        sink.clone(),
    );
    writer.start().unwrap();
    writer.commit(INDEX, doc(1)).await.unwrap();
    writer.commit(INDEX, doc(2)).await.unwrap();
    drop(writer);

    wait_for(|| sink.entry_total() == 2).await;
}

#[tokio::test]
async fn gateway_sink_writes_documents() {
    let backend = MemoryBackend::new();
    let es = EsConfig::default().with_bulk_size(4);
    let gateway = Arc::new(backend.gateway_with(es.clone()));
    let config = BatchConfig::from(&es);
    assert_eq!(config.bulk_size, 4);

    let writer = BatchWriter::new(config, gateway);
    writer.start().unwrap();
    for n in 0..10 {
        writer.commit(INDEX, doc(n)).await.unwrap();
    }
    writer.stop().await.unwrap();

    assert_eq!(backend.doc_count(INDEX), 10);
    assert_eq!(backend.calls("bulk"), 3);
    assert_eq!(writer.stats().entries_flushed, 10);
}
