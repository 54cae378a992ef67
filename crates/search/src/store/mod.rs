//! Persisted item stores backing the connectors
//!
//! A store holds the full ordered collection of one source, embeddings
//! included, and is always overwritten as a whole.

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use switchyard_common::errors::Result;
use switchyard_common::models::KnowledgeItem;

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Load the persisted collection; an absent collection is empty
    async fn load(&self) -> Result<Vec<KnowledgeItem>>;

    /// Replace the persisted collection
    async fn save(&self, items: &[KnowledgeItem]) -> Result<()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}
