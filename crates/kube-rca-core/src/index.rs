//! Batched, idempotent embedding indexer.
//!
//! Chunks are split into batches of at most `batch_size`, each chunk's
//! `content` is embedded, and every batch is written with a single
//! [`VectorStore::upsert`] call. Re-indexing an id replaces the stored
//! record.
//!
//! Failure policy: a chunk whose embedding fails is skipped and counted in
//! [`IndexReport::failed`]; the rest of its batch is still written. A store
//! failure aborts the run.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::models::Chunk;
use crate::store::{UpsertRecord, VectorStore};

/// Per-call record ceiling of the vector store. Batches must stay strictly below it.
pub const STORE_BATCH_CEILING: usize = 5461;

/// Default records per upsert call.
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Progress emitted once per written batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexProgressEvent {
    Batch {
        /// 1-based batch number.
        batch: usize,
        batches: usize,
        /// Chunk offsets `[start, end)` covered by this batch.
        start: usize,
        end: usize,
        upserted: usize,
    },
}

/// Receives indexing progress.
pub trait IndexProgress: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Discards progress.
pub struct NoProgress;

impl IndexProgress for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

/// Outcome of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub total: usize,
    pub indexed: usize,
    pub skipped_empty: usize,
    pub failed: usize,
    pub batches: usize,
}

pub struct EmbeddingIndexer<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    batch_size: usize,
    progress: &'a dyn IndexProgress,
}

impl<'a> EmbeddingIndexer<'a> {
    /// Build an indexer. `batch_size` must be in `1..STORE_BATCH_CEILING`.
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn Embedder,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        if batch_size == 0 || batch_size >= STORE_BATCH_CEILING {
            return Err(IndexError::BatchSize {
                requested: batch_size,
                ceiling: STORE_BATCH_CEILING,
            });
        }
        Ok(Self {
            store,
            embedder,
            batch_size,
            progress: &NoProgress,
        })
    }

    pub fn with_progress(mut self, progress: &'a dyn IndexProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Embed and upsert `chunks`.
    pub async fn index(&self, chunks: &[Chunk]) -> Result<IndexReport, IndexError> {
        let model = self.embedder.model_name();
        if let Some(stored) = self
            .store
            .embedding_model()
            .await
            .map_err(|e| IndexError::Store(e.to_string()))?
        {
            if stored != model {
                return Err(IndexError::ModelMismatch {
                    stored,
                    configured: model.to_string(),
                });
            }
        }

        let batches = chunks.len().div_ceil(self.batch_size);
        let mut report = IndexReport {
            total: chunks.len(),
            batches,
            ..Default::default()
        };

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            let mut records = Vec::with_capacity(batch.len());
            for chunk in batch {
                let text = chunk.content.trim();
                if text.is_empty() {
                    report.skipped_empty += 1;
                    continue;
                }
                match self.embedder.encode(text).await {
                    Ok(embedding) => {
                        let mut metadata = chunk.metadata();
                        metadata.insert("model".into(), Value::String(model.to_string()));
                        records.push(UpsertRecord {
                            id: chunk.id.clone(),
                            document: text.to_string(),
                            embedding,
                            metadata,
                        });
                    }
                    Err(e) => {
                        warn!(chunk_id = %chunk.id, error = %e, "embedding failed, skipping chunk");
                        report.failed += 1;
                    }
                }
            }

            if !records.is_empty() {
                self.store
                    .upsert(model, &records)
                    .await
                    .map_err(|e| IndexError::Store(e.to_string()))?;
            }
            report.indexed += records.len();

            let start = i * self.batch_size;
            debug!(batch = i + 1, batches, upserted = records.len(), "batch written");
            self.progress.report(IndexProgressEvent::Batch {
                batch: i + 1,
                batches,
                start,
                end: start + batch.len(),
                upserted: records.len(),
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::{ScoredChunk, StoredChunk};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeEmbedder {
        model: &'static str,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            2
        }
        async fn encode(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("POISON") {
                bail!("model rejected input");
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    /// Records the size of every upsert call.
    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn upsert(&self, _model: &str, records: &[UpsertRecord]) -> Result<()> {
            self.calls.lock().unwrap().push(records.len());
            Ok(())
        }
        async fn get(&self, _ids: Option<&[String]>) -> Result<Vec<StoredChunk>> {
            Ok(Vec::new())
        }
        async fn query(&self, _embedding: &[f32], _k: usize) -> Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
        async fn embedding_model(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.into(),
            cluster: "c".into(),
            namespace: "ns".into(),
            pod: None,
            node: None,
            object: None,
            reason: None,
            start_ts: None,
            end_ts: None,
            severity_hint: 2,
            content: content.into(),
        }
    }

    #[test]
    fn batch_size_must_stay_below_ceiling() {
        let store = InMemoryStore::new();
        let embedder = FakeEmbedder { model: "m" };
        assert!(EmbeddingIndexer::new(&store, &embedder, 0).is_err());
        assert!(EmbeddingIndexer::new(&store, &embedder, STORE_BATCH_CEILING).is_err());
        assert!(EmbeddingIndexer::new(&store, &embedder, STORE_BATCH_CEILING - 1).is_ok());
    }

    #[tokio::test]
    async fn issues_ceil_n_over_b_upserts() {
        let store = RecordingStore::default();
        let embedder = FakeEmbedder { model: "m" };
        let chunks: Vec<Chunk> = (0..23).map(|i| chunk(&format!("c{i}"), "text")).collect();

        let report = EmbeddingIndexer::new(&store, &embedder, 5)
            .unwrap()
            .index(&chunks)
            .await
            .unwrap();

        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 5);
        assert!(calls.iter().all(|&n| n <= 5));
        assert_eq!(calls.iter().sum::<usize>(), 23);
        assert_eq!(report.batches, 5);
        assert_eq!(report.indexed, 23);
    }

    #[tokio::test]
    async fn reindexing_replaces_content() {
        let store = InMemoryStore::new();
        let embedder = FakeEmbedder { model: "m" };
        let indexer = EmbeddingIndexer::new(&store, &embedder, 10).unwrap();

        indexer.index(&[chunk("a", "old text")]).await.unwrap();
        indexer.index(&[chunk("a", "new text")]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let got = store.get(Some(&["a".to_string()])).await.unwrap();
        assert_eq!(got[0].document, "new text");
        assert_eq!(got[0].metadata["model"], "m");
    }

    #[tokio::test]
    async fn skips_empty_and_failed_chunks() {
        let store = InMemoryStore::new();
        let embedder = FakeEmbedder { model: "m" };
        let chunks = vec![
            chunk("a", "fine"),
            chunk("b", "   \n "),
            chunk("c", "POISON pill"),
            chunk("d", "also fine"),
        ];
        let report = EmbeddingIndexer::new(&store, &embedder, 10)
            .unwrap()
            .index(&chunks)
            .await
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped_empty, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn refuses_to_mix_models() {
        let store = InMemoryStore::new();
        let first = FakeEmbedder { model: "mini" };
        EmbeddingIndexer::new(&store, &first, 10)
            .unwrap()
            .index(&[chunk("a", "x")])
            .await
            .unwrap();

        let second = FakeEmbedder { model: "large" };
        let err = EmbeddingIndexer::new(&store, &second, 10)
            .unwrap()
            .index(&[chunk("b", "y")])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    struct Collect(Mutex<Vec<IndexProgressEvent>>);

    impl IndexProgress for Collect {
        fn report(&self, event: IndexProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn reports_each_batch() {
        let store = InMemoryStore::new();
        let embedder = FakeEmbedder { model: "m" };
        let progress = Collect(Mutex::new(Vec::new()));
        let chunks: Vec<Chunk> = (0..3).map(|i| chunk(&format!("c{i}"), "t")).collect();
        EmbeddingIndexer::new(&store, &embedder, 2)
            .unwrap()
            .with_progress(&progress)
            .index(&chunks)
            .await
            .unwrap();

        let events = progress.0.lock().unwrap().clone();
        assert_eq!(
            events[1],
            IndexProgressEvent::Batch {
                batch: 2,
                batches: 2,
                start: 2,
                end: 3,
                upserted: 1
            }
        );
    }
}
