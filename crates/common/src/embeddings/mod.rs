//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible HTTP endpoints
//! - Deterministic hashed bag-of-words vectors (offline, tests)
//! - A throttling decorator for bulk cold-start embedding

mod hashed;
mod openai;
mod throttle;

pub use hashed::HashedEmbedder;
pub use openai::OpenAIEmbedder;
pub use throttle::ThrottledEmbedder;

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Hashed embedder width when `embedding.dimension` is unset
pub const DEFAULT_HASHED_DIMENSION: usize = 384;

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIEmbedder::new(
                key,
                Some(config.model.clone()),
                config.api_base.clone(),
                config.dimension,
                config.timeout_secs,
            )?))
        }
        "hashed" => Ok(Arc::new(HashedEmbedder::new(
            config.dimension.unwrap_or(DEFAULT_HASHED_DIMENSION),
        ))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_hashed() {
        let config = EmbeddingConfig {
            provider: "hashed".to_string(),
            dimension: Some(64),
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 64);

        let defaulted = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(defaulted.dimension(), DEFAULT_HASHED_DIMENSION);
    }

    #[test]
    fn test_openai_honours_configured_dimension() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: Some("k".to_string()),
            api_base: Some("http://127.0.0.1:9/v1".to_string()),
            model: "bge-small-en".to_string(),
            dimension: Some(384),
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_name(), "bge-small-en");
    }

    #[test]
    fn test_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
