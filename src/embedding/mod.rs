//! Embedding client
//!
//! Turns text into fixed-width vectors via an OpenAI-compatible HTTP
//! endpoint. The trait is the seam the index manager depends on; tests
//! substitute deterministic stubs.

mod http;

pub use http::HttpEmbeddingClient;

use crate::types::Embedding;
use async_trait::async_trait;
use std::fmt::Debug;

/// Errors from the embedding service
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Network or HTTP transport error
    #[error("embedding request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered with an error status
    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The API returned a different number of vectors than texts sent
    #[error("embedding response mismatch: sent {sent} texts, got {got} vectors")]
    CountMismatch { sent: usize, got: usize },

    /// A returned vector had the wrong width
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Client producing fixed-dimension embedding vectors.
///
/// Object-safe so callers can hold `Arc<dyn EmbeddingClient>`.
#[async_trait]
pub trait EmbeddingClient: Send + Sync + Debug {
    /// Embed a single text
    async fn embed(&self, text: &str) -> EmbeddingResult<Embedding>;

    /// Embed a batch of texts, preserving order.
    ///
    /// The default implementation embeds one at a time; backends with a
    /// batch wire format should override it.
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Vector width this client produces
    fn dimensions(&self) -> usize;
}
