//! Per-collection similarity index subsystem
//!
//! One [`IndexPartition`] per (collection, content-type) pair, owned by the
//! [`IndexManager`]. Partitions are flat cosine indexes over normalized
//! vectors: deterministic in insertion order, which keeps tie-breaking and
//! rebuild semantics exact.

mod manager;
mod partition;

pub use manager::IndexManager;
pub use partition::IndexPartition;

use crate::embedding::EmbeddingError;
use crate::types::{ContentType, DocumentId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors from index build/update/query/persistence
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The embedding service failed; only the current call is aborted
    #[error("embedding failure")]
    Embedding(#[from] EmbeddingError),

    /// A vector of the wrong width reached the partition
    #[error("vector dimension mismatch: partition has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index persistence failed")]
    Io(#[from] std::io::Error),

    #[error("index file malformed")]
    Corrupt(#[from] serde_json::Error),
}

/// Identifies one similarity partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub collection: String,
    pub content_type: ContentType,
}

impl PartitionKey {
    pub fn new(collection: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            collection: collection.into(),
            content_type,
        }
    }

    /// File stem used when persisting this partition
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.collection, self.content_type)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.content_type)
    }
}

/// One similarity match.
///
/// `document_id` is the matched partition document. `matched_document_id`
/// is set when a specific candidate document was scored (see
/// [`IndexManager::score_document`]): there `document_id` is the candidate
/// and `matched_document_id` its nearest neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub document_id: DocumentId,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_document_id: Option<DocumentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_key_file_stem() {
        let key = PartitionKey::new("rust", ContentType::Submission);
        assert_eq!(key.file_stem(), "rust_submission");
        assert_eq!(key.to_string(), "rust/submission");
    }
}
