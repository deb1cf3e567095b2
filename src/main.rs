//! # kube-rca CLI (`krca`)
//!
//! ## Usage
//!
//! ```bash
//! krca --config ./config/krca.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `krca init` | Create the SQLite store and schema |
//! | `krca parse-events` | Event table to event and chunk JSON lines |
//! | `krca chunk-logs` | JSON-lines container logs to temporal chunks |
//! | `krca index` | Embed chunk JSON lines into the store |
//! | `krca logs` | List stored chunks with filters, sorting and paging |
//! | `krca diagnose` | Diagnose from a chunk id or a query |
//! | `krca stats` | Store summary |
//! | `krca serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kube_rca::config;
use kube_rca::core::diagnose::DiagnoseRequest;
use kube_rca::core::retrieval::{ListRequest, LogFilter, SortOrder};
use kube_rca::progress::ProgressMode;

/// kube-rca: evidence retrieval and root-cause diagnosis for Kubernetes.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/krca.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "krca",
    about = "kube-rca: evidence retrieval and LLM-assisted root-cause diagnosis for Kubernetes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/krca.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store file and schema. Idempotent.
    Init,

    /// Parse a `kubectl get events` table into event and chunk JSON lines.
    ///
    /// Chunks group events by namespace and pod (or object) with
    /// deterministic ids, so re-indexing replaces earlier versions.
    ParseEvents {
        /// Raw event table file.
        #[arg(long)]
        input: PathBuf,

        /// Output JSON lines, one per event.
        #[arg(long, default_value = "processed/events.jsonl")]
        events_out: PathBuf,

        /// Output JSON lines, one per chunk (input to `index`).
        #[arg(long, default_value = "processed/event_chunks.jsonl")]
        chunks_out: PathBuf,
    },

    /// Build error-anchored time-window chunks from JSON-lines log files.
    ChunkLogs {
        /// Directory of `*.json` JSON-lines log files.
        #[arg(long, default_value = "samples/raw")]
        input_dir: PathBuf,

        /// Output JSON lines, one per chunk.
        #[arg(long, default_value = "processed/log_chunks.jsonl")]
        out: PathBuf,
    },

    /// Embed chunk JSON lines and upsert them into the store.
    Index {
        /// Chunk JSON lines.
        #[arg(long, default_value = "processed/event_chunks.jsonl")]
        input: PathBuf,

        /// Records per upsert call (overrides `[indexing].batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Progress on stderr: human, json, or off. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// List stored evidence chunks.
    Logs {
        #[arg(long)]
        namespace: Option<String>,

        #[arg(long)]
        pod: Option<String>,

        #[arg(long)]
        reason: Option<String>,

        /// Free-text query: semantic when embeddings are enabled, substring otherwise.
        #[arg(short, long)]
        query: Option<String>,

        /// Metadata field to sort by (e.g. `severity_hint`, `namespace`, `id`).
        #[arg(long)]
        sort_by: Option<String>,

        #[arg(long, default_value = "asc")]
        order: SortOrder,

        #[arg(long, default_value = "50")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Print the page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Diagnose an incident from stored evidence.
    ///
    /// Select evidence with exactly one of `--chunk-id` or `--query`.
    /// `--pod` alone implies the query "Investigate issue in pod <pod>".
    Diagnose {
        #[arg(long)]
        chunk_id: Option<String>,

        #[arg(short, long)]
        query: Option<String>,

        /// Number of nearest chunks for a query.
        #[arg(short, long)]
        k: Option<usize>,

        #[arg(long)]
        namespace: Option<String>,

        #[arg(long)]
        pod: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show store statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            kube_rca::migrate::run_migrations(&cfg).await?;
        }
        Commands::ParseEvents {
            input,
            events_out,
            chunks_out,
        } => {
            kube_rca::etl::run_parse_events(&cfg, &input, &events_out, &chunks_out)?;
        }
        Commands::ChunkLogs { input_dir, out } => {
            kube_rca::etl::run_chunk_logs(&cfg, &input_dir, &out)?;
        }
        Commands::Index {
            input,
            batch_size,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            kube_rca::index_cmd::run_index(&cfg, &input, batch_size, mode).await?;
        }
        Commands::Logs {
            namespace,
            pod,
            reason,
            query,
            sort_by,
            order,
            limit,
            offset,
            json,
        } => {
            let request = ListRequest {
                filter: LogFilter {
                    namespace,
                    pod,
                    reason,
                    query,
                },
                sort_by,
                order,
                limit,
                offset,
            };
            kube_rca::logs::run_logs(&cfg, &request, json).await?;
        }
        Commands::Diagnose {
            chunk_id,
            query,
            k,
            namespace,
            pod,
            json,
        } => {
            let request = DiagnoseRequest {
                chunk_id,
                query,
                k,
                namespace,
                pod,
            };
            kube_rca::diagnose_cmd::run_diagnose(&cfg, &request, json).await?;
        }
        Commands::Stats => {
            kube_rca::stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            kube_rca::server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
