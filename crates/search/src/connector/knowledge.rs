//! Connector over one persisted collection
//!
//! Readers clone an `Arc` of the current snapshot and never block writers for
//! longer than the pointer swap. Writers serialize on the write gate, stage
//! their change on a copy, persist the copy, and only then swap it in. A
//! failed persist drops the copy, leaving memory and the store in agreement.

use super::cache::{EmbeddingCache, RefreshOutcome};
use super::{Connector, SourceStats};
use crate::retrieval::{by_rank_then_id, SearchResult};
use crate::similarity::cosine_similarity;
use crate::store::ItemStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use switchyard_common::embeddings::Embedder;
use switchyard_common::errors::{AppError, Result};
use switchyard_common::models::{KnowledgeItem, SourceKind};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

type Snapshot = Arc<Vec<KnowledgeItem>>;

pub struct KnowledgeConnector {
    tag: String,
    kind: SourceKind,
    store: Arc<dyn ItemStore>,
    cache: EmbeddingCache,
    snapshot: RwLock<Snapshot>,
    write_gate: Mutex<()>,
    initialized: AtomicBool,
}

impl KnowledgeConnector {
    pub fn new(
        tag: impl Into<String>,
        kind: SourceKind,
        store: Arc<dyn ItemStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let tag = tag.into();
        Self {
            cache: EmbeddingCache::new(tag.clone(), embedder),
            tag,
            kind,
            store,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            write_gate: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn current(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Persist the staged collection, then publish it. Caller holds the write gate.
    async fn commit(&self, staged: Vec<KnowledgeItem>, operation: &str) -> Result<()> {
        if let Err(e) = self.store.save(&staged).await {
            error!(
                source = %self.tag,
                store = %self.store.describe(),
                operation,
                error = %e,
                "Persist failed, mutation rolled back"
            );
            return Err(e);
        }
        *self.snapshot.write().await = Arc::new(staged);
        Ok(())
    }

    /// Recompute derived fields and, when stale, the embedding of one item
    async fn prepare(&self, item: &mut KnowledgeItem) {
        item.refresh_derived(self.kind);
        if self.cache.is_stale(item) {
            self.cache.embed_item(item).await;
        }
    }

    fn not_found(&self, id: &str) -> AppError {
        AppError::ItemNotFound {
            source_tag: self.tag.clone(),
            id: id.to_string(),
        }
    }

    fn recent(&self, items: &[KnowledgeItem], k: usize) -> Vec<SearchResult> {
        let mut active: Vec<&KnowledgeItem> = items.iter().filter(|i| i.active).collect();
        active.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        active
            .into_iter()
            .take(k)
            .map(|item| SearchResult::new(item, &self.tag, 0.0, false))
            .collect()
    }
}

#[async_trait]
impl Connector for KnowledgeConnector {
    fn tag(&self) -> &str {
        &self.tag
    }

    #[instrument(skip(self), fields(source = %self.tag))]
    async fn initialize(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;

        let mut items = self.store.load().await?;
        let mut seen = HashSet::new();
        let loaded = items.len();
        items.retain(|item| seen.insert(item.id.clone()));
        if items.len() < loaded {
            warn!(
                source = %self.tag,
                store = %self.store.describe(),
                dropped = loaded - items.len(),
                "Duplicate item ids in store, keeping the first occurrence"
            );
        }

        let mut derived_changed = items.len() < loaded;
        for item in items.iter_mut() {
            derived_changed |= item.refresh_derived(self.kind);
        }

        let outcome = self.cache.refresh(&mut items).await;

        // Only cache entries can differ from the store here, so a failed
        // write still leaves the loaded collection usable.
        if derived_changed || outcome.changed() {
            if let Err(e) = self.store.save(&items).await {
                error!(
                    source = %self.tag,
                    store = %self.store.describe(),
                    error = %e,
                    "Failed to persist refreshed embeddings"
                );
            }
        }

        info!(
            source = %self.tag,
            kind = %self.kind,
            items = items.len(),
            refreshed = outcome.refreshed,
            failed = outcome.failed,
            "Knowledge source initialized"
        );

        *self.snapshot.write().await = Arc::new(items);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    #[instrument(skip(self), fields(source = %self.tag))]
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let items = self.current().await;
        if query.trim().is_empty() {
            return Ok(self.recent(&items, k));
        }

        let query_vector = self.cache.embed_text(query).await;
        if query_vector.is_none() {
            warn!(source = %self.tag, "Query embedding unavailable, every item scores 0");
        }

        let mut results: Vec<SearchResult> = items
            .iter()
            .filter(|item| item.active)
            .map(|item| match (&query_vector, self.cache.vector_for(item)) {
                (Some(q), Some(v)) => SearchResult::new(item, &self.tag, cosine_similarity(q, v), true),
                _ => SearchResult::new(item, &self.tag, 0.0, false),
            })
            .collect();

        results.sort_by(by_rank_then_id);
        results.truncate(k);

        debug!(source = %self.tag, returned = results.len(), "Search complete");
        Ok(results)
    }

    async fn get_all(&self) -> Result<Vec<KnowledgeItem>> {
        Ok(self.current().await.as_ref().clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<KnowledgeItem>> {
        Ok(self.current().await.iter().find(|i| i.id == id).cloned())
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<KnowledgeItem>> {
        let wanted = title.trim().to_lowercase();
        Ok(self
            .current()
            .await
            .iter()
            .find(|i| i.active && i.title.trim().to_lowercase() == wanted)
            .cloned())
    }

    #[instrument(skip(self, item), fields(source = %self.tag, id = %item.id))]
    async fn add(&self, mut item: KnowledgeItem) -> Result<()> {
        if item.id.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Item id must not be empty".to_string(),
                field: Some("id".to_string()),
            });
        }

        let _gate = self.write_gate.lock().await;
        let current = self.current().await;
        if current.iter().any(|i| i.id == item.id) {
            return Err(AppError::DuplicateItem {
                source_tag: self.tag.clone(),
                id: item.id,
            });
        }

        item.active = true;
        self.prepare(&mut item).await;

        let mut staged = current.as_ref().clone();
        staged.push(item);
        self.commit(staged, "add").await
    }

    #[instrument(skip(self, item), fields(source = %self.tag, id = %item.id))]
    async fn update(&self, item: KnowledgeItem) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let current = self.current().await;
        let index = current
            .iter()
            .position(|i| i.id == item.id)
            .ok_or_else(|| self.not_found(&item.id))?;

        let mut staged = current.as_ref().clone();
        let target = &mut staged[index];
        target.title = item.title;
        target.body = item.body;
        target.url = item.url;
        target.updated_at = Utc::now();
        self.prepare(target).await;

        self.commit(staged, "update").await
    }

    #[instrument(skip(self), fields(source = %self.tag))]
    async fn delete(&self, id: &str) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let current = self.current().await;
        let index = current
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| self.not_found(id))?;

        if !current[index].active {
            return Ok(());
        }

        let mut staged = current.as_ref().clone();
        staged[index].active = false;
        staged[index].updated_at = Utc::now();
        self.commit(staged, "delete").await
    }

    #[instrument(skip(self), fields(source = %self.tag))]
    async fn refresh_stale(&self) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        let mut staged = self.current().await.as_ref().clone();

        let RefreshOutcome { refreshed, .. } = self.cache.refresh(&mut staged).await;
        if refreshed > 0 {
            self.commit(staged, "refresh").await?;
        }
        Ok(refreshed)
    }

    async fn stats(&self) -> SourceStats {
        let items = self.current().await;
        let active: Vec<&KnowledgeItem> = items.iter().filter(|i| i.active).collect();
        let embedded = active.iter().filter(|i| self.cache.vector_for(i).is_some()).count();

        SourceStats {
            source: self.tag.clone(),
            total: items.len(),
            active: active.len(),
            embedded,
            stale: active.len() - embedded,
            initialized: self.initialized.load(Ordering::SeqCst),
        }
    }
}
