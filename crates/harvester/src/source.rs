//! External fact sources
//!
//! A source returns candidate items newer than an optional watermark. The
//! HTTP feed expects a JSON array of candidates and accepts the watermark as
//! a `since` query parameter.

use crate::errors::{HarvestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Candidate item from an external fact source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestCandidate {
    /// Opaque identifier within the source
    pub id: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait FactSource: Send + Sync {
    fn name(&self) -> &str;

    /// Candidates strictly newer than `since`, or everything available when None
    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<HarvestCandidate>>;
}

pub struct HttpFeedSource {
    url: String,
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| HarvestError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    fn error(&self, message: impl Into<String>) -> HarvestError {
        HarvestError::SourceError {
            source_name: self.url.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl FactSource for HttpFeedSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<HarvestCandidate>> {
        let mut request = self.client.get(&self.url);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.error(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.error(format!("feed returned {}", response.status())));
        }

        let candidates: Vec<HarvestCandidate> = response
            .json()
            .await
            .map_err(|e| self.error(format!("invalid feed body: {}", e)))?;

        // The feed may ignore `since`; filter locally as well.
        let candidates: Vec<_> = candidates
            .into_iter()
            .filter(|c| since.map_or(true, |s| c.timestamp > s))
            .collect();

        debug!(url = %self.url, count = candidates.len(), "Fetched harvest candidates");
        Ok(candidates)
    }
}

/// In-process source, useful for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryFactSource {
    candidates: Mutex<Vec<HarvestCandidate>>,
    fetches: AtomicUsize,
}

impl MemoryFactSource {
    pub fn new(candidates: Vec<HarvestCandidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            fetches: AtomicUsize::new(0),
        }
    }

    pub async fn push(&self, candidate: HarvestCandidate) {
        self.candidates.lock().await.push(candidate);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactSource for MemoryFactSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<HarvestCandidate>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .candidates
            .lock()
            .await
            .iter()
            .filter(|c| since.map_or(true, |s| c.timestamp > s))
            .cloned()
            .collect())
    }
}
