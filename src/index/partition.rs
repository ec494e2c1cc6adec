//! A single similarity partition: ordered vector set + flat cosine index

use super::{IndexError, PartitionKey, SimilarityResult};
use crate::types::{DocumentId, Embedding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One vector in a partition, in insertion order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub doc_id: DocumentId,
    /// Stored normalized, so similarity is a plain dot product
    pub vector: Embedding,
    pub inserted_at: DateTime<Utc>,
}

/// Similarity index for one (collection, content-type) pair.
///
/// Vectors are kept in insertion order; the structure is exactly the
/// normalized vector sequence, so a rebuild from the same documents yields
/// an identical partition. Repeated document ids replace the stored vector
/// in place (last write wins) and keep the original insertion slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPartition {
    key: PartitionKey,
    dimensions: usize,
    entries: Vec<VectorEntry>,
    built_at: DateTime<Utc>,
    dirty_count: usize,
    /// doc id -> slot in `entries`; rebuilt after deserialization
    #[serde(skip)]
    by_doc: HashMap<DocumentId, usize>,
}

impl IndexPartition {
    pub fn new(key: PartitionKey, dimensions: usize) -> Self {
        Self {
            key,
            dimensions,
            entries: Vec::new(),
            built_at: Utc::now(),
            dirty_count: 0,
            by_doc: HashMap::new(),
        }
    }

    /// Insert or replace one document's vector.
    pub fn insert(&mut self, doc_id: DocumentId, vector: Embedding) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        let vector = normalize(vector);
        match self.by_doc.get(&doc_id) {
            Some(&slot) => {
                // Last write wins; the slot keeps its insertion position
                self.entries[slot].vector = vector;
                self.entries[slot].inserted_at = Utc::now();
            }
            None => {
                self.by_doc.insert(doc_id.clone(), self.entries.len());
                self.entries.push(VectorEntry {
                    doc_id,
                    vector,
                    inserted_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    /// Nearest neighbors of `query`, best first.
    ///
    /// Scores are cosine similarity clamped to [0, 1]; equal scores break
    /// ties toward the earlier-inserted document (the scan order is the
    /// insertion order and the sort is stable).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityResult>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query = normalize(query.to_vec());
        let mut scored: Vec<SimilarityResult> = self
            .entries
            .iter()
            .map(|entry| SimilarityResult {
                document_id: entry.doc_id.clone(),
                score: cosine_score(&query, &entry.vector),
                matched_document_id: None,
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vectors merged since the last full build
    pub fn dirty_count(&self) -> usize {
        self.dirty_count
    }

    /// Record `n` merged vectors from an incremental update
    pub(crate) fn mark_dirty(&mut self, n: usize) {
        self.dirty_count += n;
    }

    /// Restore the doc-id lookup after deserialization
    pub(crate) fn rebuild_lookup(&mut self) {
        self.by_doc = self
            .entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| (entry.doc_id.clone(), slot))
            .collect();
    }

    #[cfg(test)]
    pub(crate) fn document_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.doc_id.as_str()).collect()
    }
}

/// Scale a vector to unit length. Zero vectors stay zero.
fn normalize(mut v: Embedding) -> Embedding {
    let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in v.iter_mut() {
            *x /= magnitude;
        }
    }
    v
}

/// Cosine similarity of two unit vectors, clamped into [0, 1]
fn cosine_score(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(0.0, 1.0)
}
