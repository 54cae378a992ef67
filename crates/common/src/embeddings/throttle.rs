//! Rate-limited, retrying embedder decorator
//!
//! Cold-start initialization issues one provider call per item. Providers
//! throttle, so bulk calls go through a token bucket and transient failures
//! are retried with exponential backoff.

use super::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct ThrottledEmbedder {
    inner: Arc<dyn Embedder>,
    limiter: DefaultDirectRateLimiter,
    max_retries: u32,
    initial_backoff: Duration,
}

impl ThrottledEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, requests_per_second: u32, max_retries: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            max_retries,
            initial_backoff: Duration::from_millis(200),
        }
    }

    pub fn with_initial_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    fn policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(2.0)
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(None)
            .build()
    }

    fn is_transient(err: &AppError) -> bool {
        err.is_provider_error() || matches!(err, AppError::RateLimited { .. })
    }
}

#[async_trait]
impl Embedder for ThrottledEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let attempts = AtomicU32::new(0);

        retry(self.policy(), || async {
            self.limiter.until_ready().await;
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;

            match self.inner.embed(text).await {
                Ok(vector) => Ok(vector),
                Err(e) if Self::is_transient(&e) && attempt <= self.max_retries => {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        model = self.inner.model_name(),
                        error = %e,
                        "Embedding request failed, backing off"
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails the first `failures` calls, then returns a fixed vector
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Embedder for Flaky {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(AppError::EmbeddingError {
                    message: "quota".to_string(),
                })
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let inner = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let throttled = ThrottledEmbedder::new(inner.clone(), 100, 3)
            .with_initial_backoff(Duration::from_millis(1));

        let v = throttled.embed("x").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let throttled = ThrottledEmbedder::new(inner.clone(), 100, 1)
            .with_initial_backoff(Duration::from_millis(1));

        assert!(throttled.embed("x").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
