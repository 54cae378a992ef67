//! Switchyard Common Library
//!
//! Shared code for the Switchyard crates including:
//! - Error types and handling
//! - Configuration management
//! - Knowledge item and conversation models
//! - Embedding provider abstraction
//! - Cancellation token
//! - Specialist lookup, query classifier and composer adapters
//! - Metrics and observability

pub mod cancellation;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;

// Re-export commonly used types
pub use cancellation::{CancellationToken, DropGuard};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
