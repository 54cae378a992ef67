//! Switchyard Search
//!
//! Knowledge source connectors with a versioned embedding cache, and the
//! aggregation layer that fans a query out across them.

pub mod connector;
pub mod registry;
pub mod retrieval;
pub mod similarity;
pub mod store;

pub use connector::{Connector, KnowledgeConnector, SourceStats};
pub use registry::SourceRegistry;
pub use retrieval::{AggregatedResults, Aggregator, SearchResult, SourcePriority};
pub use store::{ItemStore, JsonFileStore, MemoryStore};
