//! Embedding backend configuration

use serde::{Deserialize, Serialize};

fn default_endpoint() -> String {
    "http://127.0.0.1:8081/v1/embeddings".to_string()
}

fn default_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    64
}

/// Embedding service configuration
///
/// Points at any OpenAI-compatible embeddings endpoint:
///
/// ```toml
/// [embedding]
/// endpoint = "https://api.openai.com/v1/embeddings"
/// model = "text-embedding-3-small"
/// dimensions = 1536
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// API endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key (optional; local servers typically need none)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,
    /// Expected embedding dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum texts per embedding request
    #[serde(default = "default_batch_size")]
    pub max_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout(),
            max_batch_size: default_batch_size(),
        }
    }
}
