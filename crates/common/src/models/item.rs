//! Knowledge item with embedding versioning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Kind of backing collection; decides how searchable text is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Blob-based article sets
    Articles,
    /// Cached wiki pages (markdown-ish bodies)
    Wiki,
    /// Ticket-derived problem/resolution pairs
    Tickets,
}

impl SourceKind {
    /// Derive the text that gets embedded for an item of this kind
    pub fn derive_text(&self, title: &str, body: &str) -> String {
        match self {
            SourceKind::Articles => format!("{}\n\n{}", title.trim(), body.trim()),
            SourceKind::Wiki => {
                let body = body
                    .lines()
                    .map(|line| line.trim_start_matches('#').trim())
                    .filter(|line| !line.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{}\n{}", title.trim(), body)
            }
            SourceKind::Tickets => {
                format!("Problem: {}\nResolution: {}", title.trim(), body.trim())
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Articles => "articles",
            SourceKind::Wiki => "wiki",
            SourceKind::Tickets => "tickets",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding cache entry stored alongside its item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEmbedding {
    pub vector: Vec<f32>,

    /// Content version the vector was computed from
    pub version: String,

    /// Embedding model identifier
    pub model: String,
}

/// A searchable item owned by exactly one connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique within its source
    pub id: String,

    pub title: String,

    pub body: String,

    /// Optional link back to the original document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Derived searchable text
    #[serde(default)]
    pub text: String,

    /// Hex SHA-256 of `text`
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<CachedEmbedding>,

    /// Soft-delete flag; inactive items are kept for audit
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Content version for a derived text
pub fn content_version(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl KnowledgeItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            url: None,
            text: String::new(),
            version: String::new(),
            embedding: None,
            active: true,
            updated_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Recompute derived text and content version.
    ///
    /// Returns true when the version changed, which makes any cached
    /// embedding stale.
    pub fn refresh_derived(&mut self, kind: SourceKind) -> bool {
        let text = kind.derive_text(&self.title, &self.body);
        let version = content_version(&text);
        let changed = version != self.version;
        self.text = text;
        self.version = version;
        changed
    }

    /// Cached embedding, only if it matches the current content and provider
    pub fn fresh_embedding(&self, model: &str, dimension: usize) -> Option<&[f32]> {
        self.embedding
            .as_ref()
            .filter(|e| e.version == self.version && e.model == model && e.vector.len() == dimension)
            .map(|e| e.vector.as_slice())
    }

    /// Whether the cached embedding must be regenerated before it is trusted
    pub fn is_stale(&self, model: &str, dimension: usize) -> bool {
        self.fresh_embedding(model, dimension).is_none()
    }
}
