use anyhow::{bail, Result};
use std::path::Path;

use kube_rca_core::index::EmbeddingIndexer;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::etl::read_chunks_jsonl;
use crate::progress::ProgressMode;
use crate::sqlite_store::open_store;

/// `krca index`: embed chunk JSON lines into the store.
pub async fn run_index(
    config: &Config,
    input: &Path,
    batch_size_override: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let Some(embedder) = create_embedder(&config.embedding)? else {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    };

    let chunks = read_chunks_jsonl(input)?;
    if chunks.is_empty() {
        println!("index");
        println!("  no chunks in {}", input.display());
        return Ok(());
    }

    let store = open_store(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.indexing.batch_size);
    let reporter = progress.reporter();

    let report = EmbeddingIndexer::new(&store, embedder.as_ref(), batch_size)?
        .with_progress(reporter.as_ref())
        .index(&chunks)
        .await;
    store.close().await;
    let report = report?;

    println!("index");
    println!("  model: {}", embedder.model_name());
    println!("  total chunks: {}", report.total);
    println!("  indexed: {}", report.indexed);
    println!("  skipped (empty): {}", report.skipped_empty);
    println!("  failed: {}", report.failed);
    println!("  batches: {}", report.batches);
    Ok(())
}
