//! Offline ETL: raw cluster output to chunk JSON lines.
//!
//! - `krca parse-events`: a `kubectl get events` table becomes one JSON line
//!   per event and one JSON line per relational chunk.
//! - `krca chunk-logs`: a directory of JSON-lines container logs becomes
//!   temporal chunks around error lines.
//!
//! Both outputs feed `krca index`.

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use kube_rca_core::chunk::{ChunkPolicy, RelationalChunker, TemporalWindowChunker};
use kube_rca_core::models::{Chunk, Event, LogLine};
use kube_rca_core::normalize::parse_events;

use crate::config::Config;

pub fn read_events_file(path: &Path) -> Result<Vec<Event>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read events file: {}", path.display()))?;
    Ok(parse_events(&raw))
}

/// Write `items` as JSON lines, creating the parent directory. Returns the count written.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(items.len())
}

/// Load every `*.json` JSON-lines file directly under `dir`.
///
/// Lines that are not valid log records (bad JSON, missing or unparsable
/// `timestamp`) are skipped with a warning.
pub fn load_log_lines(dir: &Path) -> Result<Vec<LogLine>> {
    if !dir.is_dir() {
        anyhow::bail!("Log directory does not exist: {}", dir.display());
    }

    let mut lines = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let file =
            File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogLine>(line) {
                Ok(record) => lines.push(record),
                Err(e) => warn!(file = %path.display(), line = n + 1, error = %e, "skipping log line"),
            }
        }
    }
    Ok(lines)
}

/// Read chunk JSON lines written by the ETL commands (or by other tools).
///
/// Accepts `content` or the legacy `context_text` key. A missing id becomes
/// `chunk_<position>`. Invalid lines are skipped with a warning.
pub fn read_chunks_jsonl(path: &Path) -> Result<Vec<Chunk>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open chunks file: {}", path.display()))?;

    let mut chunks = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Chunk>(&line) {
            Ok(mut chunk) => {
                if chunk.id.is_empty() {
                    chunk.id = format!("chunk_{}", n);
                }
                chunks.push(chunk);
            }
            Err(e) => warn!(file = %path.display(), line = n + 1, error = %e, "skipping chunk line"),
        }
    }
    Ok(chunks)
}

/// `krca parse-events`
pub fn run_parse_events(
    config: &Config,
    input: &Path,
    events_out: &Path,
    chunks_out: &Path,
) -> Result<()> {
    let events = read_events_file(input)?;
    println!("Parsed {} events", events.len());

    write_jsonl(events_out, &events)?;
    println!("Wrote events -> {}", events_out.display());

    let chunks = RelationalChunker::new(config.cluster.name.clone()).chunk(&events);
    write_jsonl(chunks_out, &chunks)?;
    println!("Wrote {} chunks -> {}", chunks.len(), chunks_out.display());

    info!(events = events.len(), chunks = chunks.len(), "parse-events complete");
    Ok(())
}

/// `krca chunk-logs`
pub fn run_chunk_logs(config: &Config, input_dir: &Path, out: &Path) -> Result<()> {
    let logs = load_log_lines(input_dir)?;
    println!("Loaded {} log lines", logs.len());

    let chunker = TemporalWindowChunker::new(Duration::minutes(config.chunking.window_minutes))
        .with_identity(config.chunking.temporal_ids);
    let chunks = chunker.chunk(&logs);
    write_jsonl(out, &chunks)?;
    println!("Wrote {} chunks -> {}", chunks.len(), out.display());

    info!(lines = logs.len(), chunks = chunks.len(), "chunk-logs complete");
    Ok(())
}
