//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only way the pipeline touches persisted
//! evidence. The application crate provides a SQLite-backed implementation;
//! [`memory::InMemoryStore`] backs tests and one-shot runs.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// A record as persisted: id, embedded text and flat metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
}

impl StoredChunk {
    /// Metadata value as text. Numbers are rendered, anything else is `None`.
    pub fn meta_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// A stored record paired with its distance from a query vector.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub record: StoredChunk,
    /// `1 - cosine_similarity`; smaller is closer.
    pub distance: f32,
}

/// One record to insert or replace.
#[derive(Debug, Clone)]
pub struct UpsertRecord {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// Abstract vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or replace records by id |
/// | [`get`](VectorStore::get) | Fetch by id, or scan everything |
/// | [`query`](VectorStore::query) | Nearest neighbours of an embedding |
/// | [`count`](VectorStore::count) | Number of stored records |
/// | [`embedding_model`](VectorStore::embedding_model) | Model the store was indexed with |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace `records`, all embedded with `model`.
    ///
    /// Writing an id that already exists replaces the previous record.
    async fn upsert(&self, model: &str, records: &[UpsertRecord]) -> Result<()>;

    /// Fetch records by id, or every record (ordered by id) when `ids` is `None`.
    ///
    /// Unknown ids are silently absent from the result.
    async fn get(&self, ids: Option<&[String]>) -> Result<Vec<StoredChunk>>;

    /// Return up to `k` records ordered nearest first.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    async fn count(&self) -> Result<usize>;

    /// The embedding model recorded by the first upsert, if any.
    async fn embedding_model(&self) -> Result<Option<String>>;
}
