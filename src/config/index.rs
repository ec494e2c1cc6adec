//! Similarity index configuration

use crate::types::ContentType;
use serde::{Deserialize, Serialize};

fn default_query_k() -> usize {
    10
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Collections (e.g. community names) to maintain partitions for
    #[serde(default)]
    pub collections: Vec<String>,
    /// Content types indexed per collection
    #[serde(default = "default_content_types")]
    pub content_types: Vec<ContentType>,
    /// Neighbors fetched per similarity query
    #[serde(default = "default_query_k")]
    pub query_k: usize,
    /// Staleness policy: force a full rebuild once this many vectors have
    /// been merged since the last build. `None` never forces a rebuild.
    #[serde(default)]
    pub rebuild_dirty_threshold: Option<usize>,
}

fn default_content_types() -> Vec<ContentType> {
    vec![ContentType::Submission]
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            content_types: default_content_types(),
            query_k: default_query_k(),
            rebuild_dirty_threshold: None,
        }
    }
}
