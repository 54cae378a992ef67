//! Aggregated search handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::handlers::validate;
use crate::AppState;
use switchyard_common::errors::{AppError, Result};
use switchyard_search::{retrieval::SourceReport, SearchResult};

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(max = 1000))]
    pub query: String,

    /// Results requested from each source
    #[validate(range(min = 1, max = 50))]
    pub per_source_k: Option<usize>,

    /// Overall result cap
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<usize>,

    /// Restrict to these source tags; empty means all
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_results: usize,
    pub results: Vec<SearchResult>,
    /// Per-source outcome (ok, timed_out, failed)
    pub sources: Vec<SourceReport>,
    pub processing_time_ms: u64,
}

/// Fan a query out across the configured sources
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    validate(&request)?;

    for tag in &request.sources {
        if state.registry.get(tag).is_none() {
            return Err(AppError::SourceNotFound { name: tag.clone() });
        }
    }

    let aggregation = &state.config.aggregation;
    let aggregator = state.registry.aggregator(aggregation, &request.sources);
    let aggregated = aggregator
        .search_all(
            &request.query,
            request.per_source_k.unwrap_or(aggregation.per_source_k),
            request.limit.unwrap_or(aggregation.total_cap),
        )
        .await;

    Ok(Json(SearchResponse {
        query: request.query,
        total_results: aggregated.results.len(),
        results: aggregated.results,
        sources: aggregated.sources,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
