//! In-memory similarity index over embedded knowledge records.
//!
//! Pure data structure with no I/O: records are upserted by `source_id`
//! and queried by brute-force cosine similarity against a pre-computed
//! query vector. Embedding and persistence live in [`crate::kb`] and
//! [`crate::store`] so the ranking logic is testable in isolation.

use std::collections::HashMap;

use crate::embedding::cosine_similarity;
use crate::models::RecordMeta;

/// An embedded knowledge record held by the index.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub source_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub meta: RecordMeta,
}

/// A query hit: a record paired with its similarity score.
///
/// Scores are true cosine similarity clamped to `[0.0, 1.0]`; downstream
/// layers copy them through unmodified.
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub record: IndexedRecord,
    pub score: f32,
}

/// Brute-force cosine similarity index keyed by `source_id`.
#[derive(Default)]
pub struct SimilarityIndex {
    records: HashMap<String, IndexedRecord>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or overwrite records by `source_id`.
    ///
    /// Re-adding an existing id replaces that record without growing the
    /// index.
    pub fn upsert(&mut self, records: Vec<IndexedRecord>) {
        for record in records {
            self.records.insert(record.source_id.clone(), record);
        }
    }

    /// Remove all records.
    pub fn wipe(&mut self) {
        self.records.clear();
    }

    pub fn get(&self, source_id: &str) -> Option<&IndexedRecord> {
        self.records.get(source_id)
    }

    /// Iterate all records (persistence uses this to flush the index).
    pub fn records(&self) -> impl Iterator<Item = &IndexedRecord> {
        self.records.values()
    }

    /// Return up to `top_k` records ranked by descending cosine similarity
    /// to `query_vec`.
    ///
    /// Ties break on `source_id` so ordering is deterministic. An empty
    /// index yields an empty result; `top_k` larger than the index size is
    /// clamped.
    pub fn query_vec(&self, query_vec: &[f32], top_k: usize) -> Vec<ScoredHit> {
        let mut hits: Vec<ScoredHit> = self
            .records
            .values()
            .map(|record| ScoredHit {
                score: cosine_similarity(query_vec, &record.embedding).clamp(0.0, 1.0),
                record: record.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.source_id.cmp(&b.record.source_id))
        });

        hits.truncate(top_k);
        hits
    }
}
