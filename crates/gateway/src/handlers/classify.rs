//! Classification handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::handlers::validate;
use crate::AppState;
use switchyard_common::{context::ClassificationResult, errors::Result};

#[derive(Debug, Deserialize, Validate)]
pub struct ClassifyRequest {
    #[validate(length(max = 4000))]
    pub query: String,
}

/// Route decision for a query, without answering it
pub async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassificationResult>> {
    validate(&request)?;
    Ok(Json(state.router.classify(&request.query)))
}
