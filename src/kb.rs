//! The knowledge base: a similarity index paired with an embedding backend.
//!
//! [`KnowledgeBase`] owns the only write path into the index and keeps the
//! batch-upsert contract: texts are embedded first, and only a fully
//! embedded batch is committed, so an embedding failure never leaves a
//! partial write behind.

use anyhow::Result;

use crate::embedding::Embedder;
use crate::index::{IndexedRecord, ScoredHit, SimilarityIndex};
use crate::models::KbItem;

pub struct KnowledgeBase {
    index: SimilarityIndex,
    embedder: Box<dyn Embedder>,
}

impl KnowledgeBase {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            index: SimilarityIndex::new(),
            embedder,
        }
    }

    /// Build a knowledge base around an already-hydrated index (e.g. one
    /// loaded from the record store).
    pub fn from_index(index: SimilarityIndex, embedder: Box<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn wipe(&mut self) {
        self.index.wipe();
    }

    /// Embed and upsert a batch of items.
    ///
    /// All texts are embedded before anything touches the index; if the
    /// embedding call fails the index is unchanged. Returns the number of
    /// records committed.
    pub async fn add_batch(&mut self, items: Vec<KbItem>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = items.iter().map(|i| i.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        anyhow::ensure!(
            vectors.len() == items.len(),
            "Embedding backend returned {} vectors for {} texts",
            vectors.len(),
            items.len()
        );

        let records: Vec<IndexedRecord> = items
            .into_iter()
            .zip(vectors)
            .map(|(item, embedding)| IndexedRecord {
                source_id: item.source_id,
                text: item.text,
                embedding,
                meta: item.meta,
            })
            .collect();

        let count = records.len();
        self.index.upsert(records);
        Ok(count)
    }

    /// Upsert pre-embedded records directly (store hydration, cache reuse).
    pub fn add_records(&mut self, records: Vec<IndexedRecord>) {
        self.index.upsert(records);
    }

    /// Embed `text` and return up to `top_k` hits ranked by descending
    /// cosine similarity.
    ///
    /// An empty index short-circuits to an empty result without calling
    /// the embedding backend.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredHit>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&[text.to_string()]).await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response for query"))?;

        Ok(self.index.query_vec(&query_vec, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordMeta, SourceType};
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Maps exact texts to fixed vectors; unknown texts get the fallback.
    struct MapEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        fallback: Vec<f32>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Embedder for MapEmbedder {
        fn model_name(&self) -> &str {
            "map-embedder"
        }
        fn dims(&self) -> usize {
            self.fallback.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("embedding backend unavailable")
        }
    }

    fn item(source_id: &str, text: &str) -> KbItem {
        KbItem {
            source_id: source_id.to_string(),
            text: text.to_string(),
            meta: RecordMeta {
                source_type: SourceType::Faq,
                category: None,
                title: None,
                stale: false,
            },
        }
    }

    fn map_embedder(pairs: &[(&str, Vec<f32>)]) -> (MapEmbedder, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = MapEmbedder {
            vectors: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            fallback: vec![0.0, 0.0],
            calls: calls.clone(),
        };
        (embedder, calls)
    }

    #[tokio::test]
    async fn test_add_batch_then_query() {
        let (embedder, _) = map_embedder(&[
            ("password reset", vec![1.0, 0.0]),
            ("billing refunds", vec![0.0, 1.0]),
            ("how do I reset my password", vec![0.9, 0.1]),
        ]);
        let mut kb = KnowledgeBase::new(Box::new(embedder));

        kb.add_batch(vec![
            item("faq-1", "password reset"),
            item("faq-2", "billing refunds"),
        ])
        .await
        .unwrap();
        assert_eq!(kb.len(), 2);

        let hits = kb.query("how do I reset my password", 2).await.unwrap();
        assert_eq!(hits[0].record.source_id, "faq-1");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_index_untouched() {
        let mut kb = KnowledgeBase::new(Box::new(FailingEmbedder));
        let err = kb.add_batch(vec![item("faq-1", "anything")]).await;
        assert!(err.is_err());
        assert!(kb.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_query_skips_backend() {
        let (embedder, calls) = map_embedder(&[]);
        let kb = KnowledgeBase::new(Box::new(embedder));
        let hits = kb.query("anything", 3).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_batch_upserts_by_source_id() {
        let (embedder, _) = map_embedder(&[
            ("old text", vec![1.0, 0.0]),
            ("new text", vec![0.0, 1.0]),
        ]);
        let mut kb = KnowledgeBase::new(Box::new(embedder));

        kb.add_batch(vec![item("faq-1", "old text")]).await.unwrap();
        kb.add_batch(vec![item("faq-1", "new text")]).await.unwrap();
        assert_eq!(kb.len(), 1);

        let hits = kb.query("new text", 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }
}
