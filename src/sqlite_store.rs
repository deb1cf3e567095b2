//! SQLite-backed [`VectorStore`].
//!
//! Each record is one row of the `chunks` table: the embedded document,
//! its metadata as JSON and the vector as a little-endian f32 BLOB. Vector
//! queries are brute-force cosine distance over every stored row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sqlx::{QueryBuilder, Row, SqlitePool};

use kube_rca_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use kube_rca_core::store::{ScoredChunk, StoredChunk, UpsertRecord, VectorStore};

use crate::config::Config;
use crate::{db, migrate};

const MODEL_KEY: &str = "embedding_model";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connect to the configured store and make sure the schema exists.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    Ok(SqliteStore::new(pool))
}

fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn parse_metadata(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn row_to_stored(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
    let metadata_json: String = row.get("metadata_json");
    StoredChunk {
        id: row.get("id"),
        document: row.get("document"),
        metadata: parse_metadata(&metadata_json),
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, model: &str, records: &[UpsertRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO store_meta (key, value) VALUES (?, ?)")
            .bind(MODEL_KEY)
            .bind(model)
            .execute(&mut *tx)
            .await?;

        for r in records {
            let metadata_json = serde_json::to_string(&r.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document, metadata_json, embedding, model, dims,
                                    content_hash, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    model = excluded.model,
                    dims = excluded.dims,
                    content_hash = excluded.content_hash,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&r.id)
            .bind(&r.document)
            .bind(&metadata_json)
            .bind(vec_to_blob(&r.embedding))
            .bind(model)
            .bind(r.embedding.len() as i64)
            .bind(hash_text(&r.document))
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert chunk {}", r.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, ids: Option<&[String]>) -> Result<Vec<StoredChunk>> {
        let rows = match ids {
            None => {
                sqlx::query("SELECT id, document, metadata_json FROM chunks ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                let mut qb =
                    QueryBuilder::new("SELECT id, document, metadata_json FROM chunks WHERE id IN (");
                let mut separated = qb.separated(", ");
                for id in ids {
                    separated.push_bind(id);
                }
                separated.push_unseparated(")");
                qb.build().fetch_all(&self.pool).await?
            }
        };

        let mut records: Vec<StoredChunk> = rows.iter().map(row_to_stored).collect();
        if let Some(ids) = ids {
            // Preserve caller order.
            records.sort_by_key(|r| ids.iter().position(|id| *id == r.id));
        }
        Ok(records)
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query("SELECT id, document, metadata_json, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                ScoredChunk {
                    record: row_to_stored(row),
                    distance: 1.0 - cosine_similarity(embedding, &vector),
                }
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
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn embedding_model(&self) -> Result<Option<String>> {
        let model: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(MODEL_KEY)
                .fetch_optional(&self.pool)
                .await?;
        Ok(model)
    }
}
