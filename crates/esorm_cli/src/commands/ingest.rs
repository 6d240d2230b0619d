//! Ingest command implementation.

use esorm_batch::{BatchConfig, BatchStats, BatchWriter};
use esorm_gateway::Gateway;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

/// Streams NDJSON documents from `file` (or standard input) into `index`.
///
/// The caller keeps `gateway` alive past the runtime so its blocking client
/// is released outside of it.
pub fn run(
    gateway: &Arc<Gateway>,
    index: &str,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let stats = runtime.block_on(ingest(gateway, index, file))?;
    drop(runtime);

    println!(
        "committed {} documents, flushed {}, dropped {} in {} failed batches",
        stats.committed, stats.entries_flushed, stats.entries_dropped, stats.failed_batches
    );
    Ok(())
}

async fn ingest(
    gateway: &Arc<Gateway>,
    index: &str,
    file: Option<&Path>,
) -> Result<BatchStats, Box<dyn std::error::Error>> {
    let input: Box<dyn AsyncRead + Unpin + Send> = match file {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };

    let writer = BatchWriter::new(BatchConfig::from(gateway.config()), Arc::clone(gateway) as Arc<_>);
    writer.start()?;

    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0usize;
    let mut skipped = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(err) = serde_json::from_str::<serde_json::Value>(line) {
            warn!("line {}: not a JSON document: {}", line_no, err);
            skipped += 1;
            continue;
        }
        writer.commit(index, line.as_bytes().to_vec()).await?;
    }

    writer.stop().await?;
    info!(lines = line_no, skipped, index, "ingest finished");
    Ok(writer.stats())
}
