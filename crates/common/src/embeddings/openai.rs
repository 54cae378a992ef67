//! OpenAI-compatible embedding client

use super::Embedder;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder.
    ///
    /// `dimension` wins when set; otherwise it must be a known OpenAI model.
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        dimension: Option<usize>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());
        let dimension = match dimension.or_else(|| known_dimension(&model)) {
            Some(dimension) if dimension > 0 => dimension,
            _ => {
                return Err(AppError::Configuration {
                    message: format!("embedding.dimension is required for model {}", model),
                })
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout_ms: timeout_secs * 1000,
        })
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::EmbeddingTimeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    AppError::EmbeddingError {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to parse response: {}", e),
        })?;

        let embeddings: Vec<Vec<f32>> = result.data.into_iter().map(|e| e.embedding).collect();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(embeddings)
    }

    async fn timed_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let result = self.make_request(texts).await;
        metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            &self.model,
            texts.len(),
            result.is_ok(),
        );
        result
    }
}

fn known_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" | "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.timed_request(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingError {
                message: "Empty response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        const BATCH_SIZE: usize = 100;

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.timed_request(chunk).await?;
            all_embeddings.extend(embeddings);
        }
        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_dimensions() {
        let embedder =
            OpenAIEmbedder::new("k".into(), Some("text-embedding-3-large".into()), None, None, 5)
                .unwrap();
        assert_eq!(embedder.dimension(), 3072);
        assert_eq!(embedder.model_name(), "text-embedding-3-large");
    }

    #[test]
    fn test_configured_dimension_wins() {
        let embedder = OpenAIEmbedder::new(
            "k".into(),
            Some("text-embedding-3-small".into()),
            None,
            Some(512),
            5,
        )
        .unwrap();
        assert_eq!(embedder.dimension(), 512);
    }

    #[test]
    fn test_unknown_model_needs_dimension() {
        let result = OpenAIEmbedder::new("k".into(), Some("bge-small-en".into()), None, None, 5);
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_provider_error() {
        let embedder = OpenAIEmbedder::new(
            "k".into(),
            None,
            Some("http://127.0.0.1:9".into()),
            None,
            1,
        )
        .unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.is_provider_error());
    }
}
