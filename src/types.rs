//! Core types shared across the moderation queue coordinator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a stored document (submission or comment)
pub type DocumentId = String;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// The kind of content a partition holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Submission,
    Comment,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document as the index subsystem sees it: id plus text to embed.
///
/// The document store carries richer records (author, timestamps, analysis
/// results); only the (id, text) pair crosses into the index layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: DocumentId,
    pub text: String,
}

impl IndexDocument {
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_display_matches_serde() {
        assert_eq!(ContentType::Submission.to_string(), "submission");
        let json = serde_json::to_string(&ContentType::Comment).unwrap();
        assert_eq!(json, "\"comment\"");
    }
}
