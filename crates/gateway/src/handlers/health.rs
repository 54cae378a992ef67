//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;
use switchyard_search::SourceStats;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub sources: Vec<SourceStats>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: switchyard_common::VERSION.to_string(),
    })
}

/// Readiness probe - every registered source must be initialized
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let sources = state.registry.stats().await;
    let all_ready = !sources.is_empty() && sources.iter().all(|s| s.initialized);

    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_ready { "ready" } else { "not_ready" }.to_string(),
            sources,
        }),
    )
}
