//! # kube-rca core
//!
//! Pure evidence-pipeline logic for kube-rca: event normalization, the two
//! chunking policies, the vector store abstraction, batched indexing,
//! filtered retrieval and the diagnosis orchestrator.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! External collaborators (embedding model, vector store, inference
//! endpoint) are traits that the application crate implements and injects.
//!
//! ```text
//! raw events ─▶ normalize ─▶ chunk ─▶ index ─▶ VectorStore
//!                                                  │
//!                                   retrieval ◀────┤
//!                                   diagnose  ◀────┘──▶ Inference
//! ```

pub mod chunk;
pub mod diagnose;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod normalize;
pub mod response;
pub mod retrieval;
pub mod store;
