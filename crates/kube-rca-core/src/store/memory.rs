//! In-memory [`VectorStore`] implementation for tests and one-shot runs.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`, so scans are
//! ordered by id. Queries are brute-force cosine distance.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::embedding::cosine_similarity;

use super::{ScoredChunk, StoredChunk, UpsertRecord, VectorStore};

struct Entry {
    document: String,
    embedding: Vec<f32>,
    metadata: Map<String, Value>,
}

impl Entry {
    fn to_stored(&self, id: &str) -> StoredChunk {
        StoredChunk {
            id: id.to_string(),
            document: self.document.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    model: Option<String>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, model: &str, records: &[UpsertRecord]) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.model.is_none() && !records.is_empty() {
            inner.model = Some(model.to_string());
        }
        for r in records {
            inner.entries.insert(
                r.id.clone(),
                Entry {
                    document: r.document.clone(),
                    embedding: r.embedding.clone(),
                    metadata: r.metadata.clone(),
                },
            );
        }
        Ok(())
    }

    async fn get(&self, ids: Option<&[String]>) -> Result<Vec<StoredChunk>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let records = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.entries.get(id).map(|e| e.to_stored(id)))
                .collect(),
            None => inner
                .entries
                .iter()
                .map(|(id, e)| e.to_stored(id))
                .collect(),
        };
        Ok(records)
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut scored: Vec<ScoredChunk> = inner
            .entries
            .iter()
            .map(|(id, e)| ScoredChunk {
                record: e.to_stored(id),
                distance: 1.0 - cosine_similarity(embedding, &e.embedding),
            })
            .collect();
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.entries.len())
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        Ok(self.inner.read().map_err(poisoned)?.model.clone())
    }
}
