use super::ItemStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use switchyard_common::errors::{AppError, Result};
use switchyard_common::models::KnowledgeItem;
use tokio::sync::Mutex;

/// In-process store for sources without a file and for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<KnowledgeItem>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<KnowledgeItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail with a persistence error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Vec<KnowledgeItem> {
        self.items.lock().await.clone()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn load(&self) -> Result<Vec<KnowledgeItem>> {
        Ok(self.items.lock().await.clone())
    }

    async fn save(&self, items: &[KnowledgeItem]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::Persistence {
                message: "memory store is rejecting writes".to_string(),
            });
        }
        *self.items.lock().await = items.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
