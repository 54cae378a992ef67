//! Cross-source fan-out search
//!
//! Each connector is searched concurrently under its own timeout. A source
//! that times out or errors contributes nothing and is recorded in the report;
//! it never fails or delays the overall call beyond its timeout.

use super::{by_rank, SearchResult};
use crate::connector::Connector;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_common::config::AggregationConfig;
use switchyard_common::metrics::{record_aggregation, record_source_search};
use tracing::{info, instrument, warn};

/// Declared tie-break order of source tags
#[derive(Debug, Clone, Default)]
pub struct SourcePriority {
    order: Vec<String>,
}

impl SourcePriority {
    pub fn new(order: Vec<String>) -> Self {
        Self { order }
    }

    /// Listed sources first in list order, then the rest alphabetically
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let rank = |tag: &str| self.order.iter().position(|p| p == tag).unwrap_or(usize::MAX);
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    TimedOut,
    Failed { message: String },
}

impl SourceStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Ok => "ok",
            SourceStatus::TimedOut => "timeout",
            SourceStatus::Failed { .. } => "error",
        }
    }
}

/// Per-source outcome of one aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub returned: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedResults {
    pub results: Vec<SearchResult>,
    pub sources: Vec<SourceReport>,
}

pub struct Aggregator {
    connectors: Vec<Arc<dyn Connector>>,
    priority: SourcePriority,
    source_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        connectors: Vec<Arc<dyn Connector>>,
        priority: SourcePriority,
        source_timeout: Duration,
    ) -> Self {
        Self {
            connectors,
            priority,
            source_timeout,
        }
    }

    pub fn from_config(connectors: Vec<Arc<dyn Connector>>, config: &AggregationConfig) -> Self {
        Self::new(
            connectors,
            SourcePriority::new(config.source_priority.clone()),
            Duration::from_millis(config.source_timeout_ms),
        )
    }

    pub fn source_count(&self) -> usize {
        self.connectors.len()
    }

    /// Global ordering: rank, then source priority, then item id
    pub fn compare(&self, a: &SearchResult, b: &SearchResult) -> Ordering {
        by_rank(a, b)
            .then_with(|| self.priority.compare(&a.source, &b.source))
            .then_with(|| a.item.id.cmp(&b.item.id))
    }

    #[instrument(skip(self), fields(sources = self.connectors.len()))]
    pub async fn search_all(
        &self,
        query: &str,
        per_source_k: usize,
        total_cap: usize,
    ) -> AggregatedResults {
        let started = Instant::now();

        let searches = self.connectors.iter().map(|connector| async move {
            let source_started = Instant::now();
            let outcome =
                tokio::time::timeout(self.source_timeout, connector.search(query, per_source_k))
                    .await;
            (connector.tag().to_string(), outcome, source_started.elapsed())
        });

        let mut results = Vec::new();
        let mut sources = Vec::with_capacity(self.connectors.len());

        for (source, outcome, elapsed) in join_all(searches).await {
            let (status, hits) = match outcome {
                Ok(Ok(hits)) => (SourceStatus::Ok, hits),
                Ok(Err(e)) => {
                    warn!(source = %source, error = %e, "Source search failed, skipping");
                    (SourceStatus::Failed { message: e.to_string() }, Vec::new())
                }
                Err(_) => {
                    warn!(
                        source = %source,
                        timeout_ms = self.source_timeout.as_millis() as u64,
                        "Source search timed out, skipping"
                    );
                    (SourceStatus::TimedOut, Vec::new())
                }
            };

            record_source_search(&source, status.as_str());
            sources.push(SourceReport {
                source,
                status,
                returned: hits.len(),
                elapsed_ms: elapsed.as_millis() as u64,
            });
            results.extend(hits);
        }

        results.sort_by(|a, b| self.compare(a, b));
        results.truncate(total_cap);

        let elapsed = started.elapsed();
        record_aggregation(elapsed.as_secs_f64(), results.len());
        info!(
            returned = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Aggregated search complete"
        );

        AggregatedResults { results, sources }
    }
}
