//! Store statistics.
//!
//! A quick summary of what is indexed: chunk count, embedding model and a
//! per-namespace breakdown. Used by `krca stats` to confirm that indexing
//! worked.

use anyhow::Result;
use std::collections::BTreeMap;

use kube_rca_core::store::VectorStore;

use crate::config::Config;
use crate::sqlite_store::open_store;

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;

    let total = store.count().await?;
    let model = store.embedding_model().await?;
    let records = store.get(None).await?;
    store.close().await;

    let mut by_namespace: BTreeMap<String, (usize, u8)> = BTreeMap::new();
    for record in &records {
        let ns = record
            .meta_str("namespace")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "(none)".to_string());
        let severity = record
            .meta_str("severity_hint")
            .and_then(|s| s.parse::<u8>().ok())
            .unwrap_or(0);
        let entry = by_namespace.entry(ns).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.max(severity);
    }

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("kube-rca: Store Stats");
    println!("=====================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Chunks:      {}", total);
    println!("  Model:       {}", model.as_deref().unwrap_or("(not indexed)"));

    if !by_namespace.is_empty() {
        println!();
        println!("  By namespace:");
        println!("  {:<32} {:>8} {:>12}", "NAMESPACE", "CHUNKS", "MAX SEVERITY");
        println!("  {}", "-".repeat(54));
        for (ns, (count, severity)) in &by_namespace {
            println!("  {:<32} {:>8} {:>12}", ns, count, severity);
        }
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
