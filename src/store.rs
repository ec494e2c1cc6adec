//! Document store client
//!
//! The store itself is an external collaborator; this module is the thin
//! read interface the index build path consumes, plus the trigger for the
//! daily processing run. Analysis results are written back by the services
//! themselves, never from here.

use crate::config::{Credentials, StoreConfig};
use crate::types::{ContentType, IndexDocument};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// A raw document as the store returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredDocument {
    /// Collapse to the (id, text) pair the index layer works with.
    /// Body and title are concatenated so both contribute to similarity.
    pub fn to_index_document(&self) -> IndexDocument {
        let text = if self.title.is_empty() {
            self.text.clone()
        } else {
            format!("{} {}", self.text, self.title)
        };
        IndexDocument::new(self.id.clone(), text)
    }
}

/// Read access to the append-only document store
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch all documents of one content type in one collection
    async fn fetch(
        &self,
        collection: &str,
        content_type: ContentType,
    ) -> Result<Vec<StoredDocument>>;
}

/// HTTP client for the document store's query API
pub struct HttpDocumentStore {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    documents: Vec<StoredDocument>,
}

#[derive(Debug, Serialize)]
struct ProcessingRequest<'a> {
    credentials: &'a Credentials,
    collections: &'a [String],
}

impl HttpDocumentStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build document store client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Kick off a daily processing run on the data processing service.
    ///
    /// The service fans out to the analysis backends and writes results to
    /// the store; this call only reports whether the run was accepted.
    pub async fn trigger_processing(
        &self,
        credentials: &Credentials,
        collections: &[String],
    ) -> Result<()> {
        let url = format!("{}/process", self.endpoint);
        info!(collections = collections.len(), "triggering processing run");

        let response = self
            .client
            .post(&url)
            .json(&ProcessingRequest {
                credentials,
                collections,
            })
            .send()
            .await
            .context("Processing trigger request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Processing run rejected (status {}): {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentStore {
    async fn fetch(
        &self,
        collection: &str,
        content_type: ContentType,
    ) -> Result<Vec<StoredDocument>> {
        let url = format!("{}/collections/{}/documents", self.endpoint, collection);
        debug!(%collection, %content_type, "fetching documents");

        let response = self
            .client
            .get(&url)
            .query(&[("content_type", content_type.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to fetch documents for '{}'", collection))?
            .error_for_status()
            .with_context(|| format!("Document store rejected fetch for '{}'", collection))?;

        let parsed: FetchResponse = response
            .json()
            .await
            .context("Malformed document store response")?;
        Ok(parsed.documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_document_joins_text_and_title() {
        let doc = StoredDocument {
            id: "t3_abc".to_string(),
            title: "Broken build".to_string(),
            text: "The CI fails on main".to_string(),
            author: None,
            created_at: None,
        };
        let idx = doc.to_index_document();
        assert_eq!(idx.id, "t3_abc");
        assert_eq!(idx.text, "The CI fails on main Broken build");
    }

    #[test]
    fn empty_title_does_not_pad_text() {
        let doc = StoredDocument {
            id: "t3_x".to_string(),
            title: String::new(),
            text: "body only".to_string(),
            author: None,
            created_at: None,
        };
        assert_eq!(doc.to_index_document().text, "body only");
    }
}
