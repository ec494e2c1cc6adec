//! HTTP embedding backend for OpenAI-compatible APIs
//!
//! Works against OpenAI, Azure OpenAI, and local servers (LM Studio, vLLM,
//! Ollama in OpenAI-compat mode, text-embeddings-inference).

use super::{EmbeddingClient, EmbeddingError, EmbeddingResult};
use crate::config::EmbeddingConfig;
use crate::types::Embedding;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Embedding client speaking the OpenAI embeddings wire format
#[derive(Debug)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl HttpEmbeddingClient {
    /// Build a client from config. Fails only on malformed header values.
    pub fn new(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = config.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_batch_size: config.max_batch_size.max(1),
        })
    }

    /// Send one wire-level batch (at most `max_batch_size` texts)
    async fn request_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts.iter().map(String::as_str).collect(),
        };

        debug!(count = texts.len(), endpoint = %self.endpoint, "embedding batch");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        collect_vectors(parsed, texts.len(), self.dimensions)
    }
}

/// Reorder response vectors by their declared index and check shape.
fn collect_vectors(
    response: EmbeddingResponse,
    sent: usize,
    expected_dims: usize,
) -> EmbeddingResult<Vec<Embedding>> {
    if response.data.len() != sent {
        return Err(EmbeddingError::CountMismatch {
            sent,
            got: response.data.len(),
        });
    }

    let mut out: Vec<Option<Embedding>> = vec![None; sent];
    for item in response.data {
        if item.embedding.len() != expected_dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: expected_dims,
                got: item.embedding.len(),
            });
        }
        if item.index >= sent {
            return Err(EmbeddingError::CountMismatch { sent, got: item.index + 1 });
        }
        out[item.index] = Some(item.embedding);
    }

    out.into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.ok_or(EmbeddingError::CountMismatch {
                sent,
                got: i,
            })
        })
        .collect()
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> EmbeddingResult<Embedding> {
        let texts = [text.to_string()];
        let mut vectors = self.request_batch(&texts).await?;
        vectors
            .pop()
            .ok_or(EmbeddingError::CountMismatch { sent: 1, got: 0 })
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch_size) {
            out.extend(self.request_batch(chunk).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
