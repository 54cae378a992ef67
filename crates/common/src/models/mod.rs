//! Core data models
//!
//! Types shared by connectors, the router and the harvester.

mod item;
mod chat;

pub use item::{content_version, CachedEmbedding, KnowledgeItem, SourceKind};
pub use chat::{ChatRole, ChatTurn, Citation};
