//! Embedding cache maintenance
//!
//! Vectors live on the items themselves, tagged with the content version and
//! model that produced them. A vector is trusted only while both still match.

use std::sync::Arc;
use switchyard_common::embeddings::Embedder;
use switchyard_common::metrics::record_embedding_cache;
use switchyard_common::models::{CachedEmbedding, KnowledgeItem};
use tracing::{debug, warn};

/// Outcome of a refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub refreshed: usize,
    pub failed: usize,
}

impl RefreshOutcome {
    pub fn changed(&self) -> bool {
        self.refreshed > 0
    }
}

pub struct EmbeddingCache {
    source: String,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingCache {
    pub fn new(source: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            source: source.into(),
            embedder,
        }
    }

    pub fn model(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Trusted vector for an item, if any
    pub fn vector_for<'a>(&self, item: &'a KnowledgeItem) -> Option<&'a [f32]> {
        item.fresh_embedding(self.model(), self.dimension())
    }

    pub fn is_stale(&self, item: &KnowledgeItem) -> bool {
        item.is_stale(self.model(), self.dimension())
    }

    /// Embed arbitrary text; any failure or dimension mismatch yields None
    pub async fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(vector) if vector.len() == self.dimension() => Some(vector),
            Ok(vector) => {
                warn!(
                    source = %self.source,
                    expected = self.dimension(),
                    actual = vector.len(),
                    "Embedding has wrong dimension, treating as zero vector"
                );
                None
            }
            Err(e) => {
                warn!(source = %self.source, error = %e, "Embedding failed, treating as zero vector");
                None
            }
        }
    }

    /// Regenerate one item's embedding. On failure the stale entry is dropped
    /// so the item scores 0 until a later refresh succeeds.
    pub async fn embed_item(&self, item: &mut KnowledgeItem) -> bool {
        match self.embed_text(&item.text).await {
            Some(vector) => {
                item.embedding = Some(CachedEmbedding {
                    vector,
                    version: item.version.clone(),
                    model: self.model().to_string(),
                });
                true
            }
            None => {
                warn!(source = %self.source, id = %item.id, "Item left without embedding");
                item.embedding = None;
                false
            }
        }
    }

    /// Regenerate every missing or stale embedding among active items
    pub async fn refresh(&self, items: &mut [KnowledgeItem]) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();
        let mut hits = 0;

        for item in items.iter_mut().filter(|i| i.active) {
            if !self.is_stale(item) {
                hits += 1;
                continue;
            }
            if self.embed_item(item).await {
                outcome.refreshed += 1;
            } else {
                outcome.failed += 1;
            }
        }

        record_embedding_cache(&self.source, "hit", hits);
        record_embedding_cache(&self.source, "refreshed", outcome.refreshed);
        record_embedding_cache(&self.source, "degraded", outcome.failed);
        debug!(
            source = %self.source,
            hits,
            refreshed = outcome.refreshed,
            failed = outcome.failed,
            "Embedding cache refreshed"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_common::embeddings::HashedEmbedder;
    use switchyard_common::models::SourceKind;

    fn item(id: &str, title: &str) -> KnowledgeItem {
        let mut item = KnowledgeItem::new(id, title, "body");
        item.refresh_derived(SourceKind::Articles);
        item
    }

    #[tokio::test]
    async fn test_refresh_only_touches_stale_items() {
        let cache = EmbeddingCache::new("wiki", Arc::new(HashedEmbedder::new(16)));
        let mut items = vec![item("a", "VPN"), item("b", "Printer")];

        let first = cache.refresh(&mut items).await;
        assert_eq!(first, RefreshOutcome { refreshed: 2, failed: 0 });

        let second = cache.refresh(&mut items).await;
        assert!(!second.changed());

        items[1].title = "Printer offline".to_string();
        assert!(items[1].refresh_derived(SourceKind::Articles));
        assert!(cache.is_stale(&items[1]));
        let third = cache.refresh(&mut items).await;
        assert_eq!(third.refreshed, 1);
    }

    #[tokio::test]
    async fn test_other_model_is_stale() {
        let cache = EmbeddingCache::new("wiki", Arc::new(HashedEmbedder::new(16)));
        let mut item = item("a", "VPN");
        item.embedding = Some(CachedEmbedding {
            vector: vec![0.0; 16],
            version: item.version.clone(),
            model: "another-model".to_string(),
        });
        assert!(cache.is_stale(&item));
        assert!(cache.vector_for(&item).is_none());
    }

    #[tokio::test]
    async fn test_inactive_items_skipped() {
        let cache = EmbeddingCache::new("wiki", Arc::new(HashedEmbedder::new(16)));
        let mut items = vec![item("a", "VPN")];
        items[0].active = false;
        assert_eq!(cache.refresh(&mut items).await.refreshed, 0);
        assert!(items[0].embedding.is_none());
    }
}
