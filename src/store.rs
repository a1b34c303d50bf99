//! Persistent record store for the knowledge base.
//!
//! [`RecordStore`] is the repository between SQLite and the in-memory
//! [`SimilarityIndex`](crate::index::SimilarityIndex): `load` hydrates an
//! index from disk and `replace_all` flushes a rebuilt record set inside a
//! single transaction, so a reader never observes a half-rebuilt store.
//! Embeddings persist as little-endian f32 BLOBs keyed by a SHA-256
//! content hash, which lets a rebuild reuse vectors for unchanged text.

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::index::{IndexedRecord, SimilarityIndex};
use crate::models::RecordMeta;

/// SHA-256 hex digest of a record's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Load every persisted record into a fresh similarity index.
    pub async fn load(&self) -> Result<SimilarityIndex> {
        let rows = sqlx::query(
            "SELECT source_id, source_type, category, title, stale, text, embedding \
             FROM records ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let source_type: String = row.get("source_type");
            let blob: Vec<u8> = row.get("embedding");
            records.push(IndexedRecord {
                source_id: row.get("source_id"),
                text: row.get("text"),
                embedding: blob_to_vec(&blob),
                meta: RecordMeta {
                    source_type: source_type
                        .parse()
                        .with_context(|| "Corrupt record store: bad source_type")?,
                    category: row.get("category"),
                    title: row.get("title"),
                    stale: row.get::<i64, _>("stale") != 0,
                },
            });
        }

        let mut index = SimilarityIndex::new();
        index.upsert(records);
        Ok(index)
    }

    /// Wipe and repopulate the store in one transaction.
    ///
    /// Readers connected to the same database see either the old record
    /// set or the new one, never a partial rebuild.
    pub async fn replace_all(
        &self,
        records: &[IndexedRecord],
        model: &str,
        dims: usize,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;

        for record in records {
            sqlx::query(
                "INSERT INTO records \
                 (source_id, source_type, category, title, stale, text, embedding, model, dims, content_hash, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.source_id)
            .bind(record.meta.source_type.as_str())
            .bind(&record.meta.category)
            .bind(&record.meta.title)
            .bind(record.meta.stale as i64)
            .bind(&record.text)
            .bind(vec_to_blob(&record.embedding))
            .bind(model)
            .bind(dims as i64)
            .bind(content_hash(&record.text))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Map of `content_hash` to stored embedding for the given model.
    ///
    /// A rebuild consults this before calling the embedding backend, so
    /// unchanged text keeps its vector for free.
    pub async fn embedding_cache(&self, model: &str) -> Result<HashMap<String, Vec<f32>>> {
        let rows = sqlx::query("SELECT content_hash, embedding FROM records WHERE model = ?")
            .bind(model)
            .fetch_all(&self.pool)
            .await?;

        let mut cache = HashMap::with_capacity(rows.len());
        for row in rows {
            let hash: String = row.get("content_hash");
            let blob: Vec<u8> = row.get("embedding");
            cache.insert(hash, blob_to_vec(&blob));
        }
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use crate::models::SourceType;
    use tempfile::TempDir;

    fn record(source_id: &str, text: &str, stale: bool) -> IndexedRecord {
        IndexedRecord {
            source_id: source_id.to_string(),
            text: text.to_string(),
            embedding: vec![0.25, -0.5, 0.75],
            meta: RecordMeta {
                source_type: SourceType::PastTicket,
                category: Some("billing".to_string()),
                title: None,
                stale,
            },
        }
    }

    async fn test_store(tmp: &TempDir) -> RecordStore {
        let pool = db::connect(&tmp.path().join("kb.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        RecordStore::new(pool)
    }

    #[tokio::test]
    async fn test_replace_all_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        let records = vec![record("ticket-1", "resolved by reset", false),
                           record("ticket-2", "old flow, no longer valid", true)];
        store.replace_all(&records, "test-model", 3).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let index = store.load().await.unwrap();
        assert_eq!(index.len(), 2);
        let loaded = index.get("ticket-2").unwrap();
        assert!(loaded.meta.stale);
        assert_eq!(loaded.embedding, vec![0.25, -0.5, 0.75]);
        assert_eq!(loaded.meta.source_type, SourceType::PastTicket);
    }

    #[tokio::test]
    async fn test_replace_all_wipes_previous_generation() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        store
            .replace_all(&[record("ticket-1", "a", false)], "m", 3)
            .await
            .unwrap();
        store
            .replace_all(&[record("ticket-9", "b", false)], "m", 3)
            .await
            .unwrap();

        let index = store.load().await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get("ticket-1").is_none());
        assert!(index.get("ticket-9").is_some());
    }

    #[tokio::test]
    async fn test_embedding_cache_keyed_by_hash_and_model() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp).await;

        store
            .replace_all(&[record("ticket-1", "same text", false)], "model-a", 3)
            .await
            .unwrap();

        let cache = store.embedding_cache("model-a").await.unwrap();
        assert_eq!(
            cache.get(&content_hash("same text")),
            Some(&vec![0.25f32, -0.5, 0.75])
        );

        let other = store.embedding_cache("model-b").await.unwrap();
        assert!(other.is_empty());
    }
}
