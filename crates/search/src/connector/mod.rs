//! Knowledge source connectors
//!
//! Every backing collection sits behind the same [`Connector`] capability
//! trait. The only implementation shipped here, [`KnowledgeConnector`], is
//! parameterized by a [`SourceKind`](switchyard_common::models::SourceKind)
//! and an [`ItemStore`](crate::store::ItemStore).

mod cache;
mod knowledge;

pub use cache::{EmbeddingCache, RefreshOutcome};
pub use knowledge::KnowledgeConnector;

use crate::retrieval::SearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchyard_common::errors::Result;
use switchyard_common::models::KnowledgeItem;

/// Item counts for readiness reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: String,
    pub total: usize,
    pub active: usize,
    pub embedded: usize,
    pub stale: usize,
    pub initialized: bool,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Provenance tag attached to every result
    fn tag(&self) -> &str;

    /// Load persisted items and bring their embeddings up to date
    async fn initialize(&self) -> Result<()>;

    /// Top-k active items for the query
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;

    /// Every item, inactive ones included
    async fn get_all(&self) -> Result<Vec<KnowledgeItem>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<KnowledgeItem>>;

    /// Exact case-insensitive title match over active items
    async fn find_by_title(&self, title: &str) -> Result<Option<KnowledgeItem>>;

    /// Insert a new item; an existing id is rejected.
    ///
    /// The caller's `updated_at` is kept as the item's timestamp.
    async fn add(&self, item: KnowledgeItem) -> Result<()>;

    /// Replace title/body/url of an existing item
    async fn update(&self, item: KnowledgeItem) -> Result<()>;

    /// Soft delete
    async fn delete(&self, id: &str) -> Result<()>;

    /// Regenerate missing or stale embeddings; returns how many were refreshed
    async fn refresh_stale(&self) -> Result<usize>;

    async fn stats(&self) -> SourceStats;
}
