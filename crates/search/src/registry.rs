//! Explicit set of configured knowledge sources
//!
//! Built once at startup and handed to whoever needs connectors; there is no
//! process-wide registry.

use crate::connector::{Connector, KnowledgeConnector, SourceStats};
use crate::retrieval::Aggregator;
use crate::store::{ItemStore, JsonFileStore, MemoryStore};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use switchyard_common::config::{AggregationConfig, SourceConfig};
use switchyard_common::embeddings::Embedder;
use switchyard_common::errors::{AppError, Result};
use tracing::{error, info};

#[derive(Clone, Default)]
pub struct SourceRegistry {
    connectors: Vec<Arc<dyn Connector>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One connector per enabled source; sources without a path live in memory
    pub fn from_config(sources: &[SourceConfig], embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut registry = Self::new();
        for source in sources.iter().filter(|s| s.enabled) {
            let store: Arc<dyn ItemStore> = match &source.path {
                Some(path) => Arc::new(JsonFileStore::new(path)),
                None => Arc::new(MemoryStore::new()),
            };
            registry.register(Arc::new(KnowledgeConnector::new(
                source.name.clone(),
                source.kind,
                store,
                embedder.clone(),
            )))?;
        }
        Ok(registry)
    }

    /// Add a connector; tags must be unique
    pub fn register(&mut self, connector: Arc<dyn Connector>) -> Result<()> {
        if self.get(connector.tag()).is_some() {
            return Err(AppError::Configuration {
                message: format!("Duplicate knowledge source: {}", connector.tag()),
            });
        }
        self.connectors.push(connector);
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.iter().find(|c| c.tag() == tag).cloned()
    }

    pub fn require(&self, tag: &str) -> Result<Arc<dyn Connector>> {
        self.get(tag).ok_or_else(|| AppError::SourceNotFound {
            name: tag.to_string(),
        })
    }

    pub fn connectors(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    pub fn tags(&self) -> Vec<String> {
        self.connectors.iter().map(|c| c.tag().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Initialize every source concurrently. A source that fails stays empty
    /// and is reported; the rest still come up.
    pub async fn initialize_all(&self) -> Vec<(String, AppError)> {
        let outcomes = join_all(
            self.connectors
                .iter()
                .map(|c| async move { (c.tag().to_string(), c.initialize().await) }),
        )
        .await;

        let mut failures = Vec::new();
        for (tag, outcome) in outcomes {
            if let Err(e) = outcome {
                error!(source = %tag, error = %e, "Knowledge source failed to initialize");
                failures.push((tag, e));
            }
        }
        info!(
            sources = self.connectors.len(),
            failed = failures.len(),
            "Knowledge sources initialized"
        );
        failures
    }

    pub async fn stats(&self) -> Vec<SourceStats> {
        join_all(self.connectors.iter().map(|c| c.stats())).await
    }

    /// Aggregator over a subset of sources, or all when `only` is empty
    pub fn aggregator(&self, config: &AggregationConfig, only: &[String]) -> Aggregator {
        let wanted: HashSet<&str> = only.iter().map(String::as_str).collect();
        let connectors = self
            .connectors
            .iter()
            .filter(|c| wanted.is_empty() || wanted.contains(c.tag()))
            .cloned()
            .collect();
        Aggregator::from_config(connectors, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_common::config::AppConfig;
    use switchyard_common::embeddings::HashedEmbedder;
    use switchyard_common::models::{KnowledgeItem, SourceKind};

    /// Default source set, kept in memory
    fn registry() -> SourceRegistry {
        let sources: Vec<SourceConfig> = AppConfig::default()
            .sources
            .into_iter()
            .map(|s| SourceConfig { path: None, ..s })
            .collect();
        SourceRegistry::from_config(&sources, Arc::new(HashedEmbedder::new(32))).unwrap()
    }

    #[tokio::test]
    async fn test_builds_enabled_sources() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            SourceConfig {
                name: "wiki".to_string(),
                kind: SourceKind::Wiki,
                path: Some(dir.path().join("wiki.json").display().to_string()),
                enabled: true,
            },
            SourceConfig {
                name: "old".to_string(),
                kind: SourceKind::Articles,
                path: None,
                enabled: false,
            },
        ];
        let registry =
            SourceRegistry::from_config(&sources, Arc::new(HashedEmbedder::new(32))).unwrap();

        assert_eq!(registry.tags(), vec!["wiki".to_string()]);
        assert!(registry.initialize_all().await.is_empty());
        assert!(registry.require("old").is_err());
    }

    #[tokio::test]
    async fn test_duplicate_tag_rejected() {
        let mut registry = registry();
        let first = registry.connectors()[0].clone();
        assert!(registry.register(first).is_err());
    }

    #[tokio::test]
    async fn test_aggregator_subset() {
        let registry = registry();
        registry.initialize_all().await;
        let wiki = registry.require("wiki").unwrap();
        wiki.add(KnowledgeItem::new("w1", "VPN setup", "Install the client"))
            .await
            .unwrap();

        let config = AggregationConfig::default();
        let only_wiki = registry.aggregator(&config, &["wiki".to_string()]);
        assert_eq!(only_wiki.source_count(), 1);

        let out = only_wiki.search_all("vpn client", 5, 5).await;
        assert_eq!(out.results[0].item.id, "w1");
        assert_eq!(registry.aggregator(&config, &[]).source_count(), registry.len());
    }
}
