//! Deterministic hashed bag-of-words embedder
//!
//! Identical text always maps to the identical unit vector, and texts that
//! share words point in similar directions. Used offline and in tests.

use super::Embedder;
use crate::errors::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous form used by callers that need vectors without a runtime
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let digest = Sha256::digest(token.as_bytes());
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn model_name(&self) -> &str {
        "hashed-bow"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashedEmbedder::new(128);
        let a = embedder.embed("Reset VPN password").await.unwrap();
        let b = embedder.embed("reset vpn PASSWORD").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[tokio::test]
    async fn test_shared_words_are_closer() {
        let embedder = HashedEmbedder::new(256);
        let query = embedder.embed("request SAP access").await.unwrap();
        let near = embedder.embed("SAP access request form").await.unwrap();
        let far = embedder.embed("printer offline fix").await.unwrap();
        assert!(dot(&query, &near) > dot(&query, &far));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashedEmbedder::new(16);
        let v = embedder.embed("  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashedEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }
}
