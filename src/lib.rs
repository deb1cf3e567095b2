//! # kube-rca
//!
//! Evidence retrieval and LLM-assisted root-cause diagnosis for Kubernetes
//! clusters.
//!
//! Raw cluster events and container logs are normalized, grouped into
//! evidence chunks, embedded into a local SQLite vector store, and later
//! retrieved by structured filter and/or semantic similarity to ground a
//! diagnosis prompt sent to a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ events table │──▶│ parse-events │──▶│              │
//! │ JSON logs    │──▶│ chunk-logs   │──▶│    index     │──▶ SQLite
//! └──────────────┘   └──────────────┘   └──────────────┘      │
//!                                                             │
//!                          ┌──────────────────────────────────┤
//!                          ▼                                  ▼
//!                    ┌──────────┐                       ┌──────────┐
//!                    │   CLI    │                       │   HTTP   │
//!                    │  (krca)  │                       │  (axum)  │──▶ LLM
//!                    └──────────┘                       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! krca init
//! krca parse-events --input events.txt
//! krca index --input processed/event_chunks.jsonl
//! krca logs --namespace payments --sort-by severity_hint --order desc
//! krca diagnose --pod api-7d9f-x2
//! krca serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | Persistent vector store |
//! | [`embedding`] | Embedding backends |
//! | [`inference`] | LLM inference client |
//! | [`etl`] | Event table and log chunking |
//! | [`index_cmd`] | Batched indexing command |
//! | [`logs`] | Evidence listing command |
//! | [`diagnose_cmd`] | Diagnosis command |
//! | [`stats`] | Store statistics |
//! | [`progress`] | Indexing progress reporters |
//! | [`server`] | HTTP API |
//!
//! The pure pipeline (normalizer, chunkers, indexer, retrieval, orchestrator)
//! lives in the `kube-rca-core` crate.

pub mod config;
pub mod db;
pub mod diagnose_cmd;
pub mod embedding;
pub mod etl;
pub mod index_cmd;
pub mod inference;
pub mod logs;
pub mod migrate;
pub mod progress;
pub mod server;
pub mod sqlite_store;
pub mod stats;

pub use kube_rca_core as core;
