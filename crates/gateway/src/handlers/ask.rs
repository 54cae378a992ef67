//! Answer handlers (single-shot and Server-Sent Events)

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use validator::Validate;

use crate::handlers::validate;
use crate::AppState;
use switchyard_common::{errors::Result, models::ChatTurn};
use switchyard_context::{AnswerEvent, AskResponse};

/// Ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    /// Blank questions are answered with a structured failure, not rejected
    #[validate(length(max = 4000))]
    pub question: String,

    /// Prior conversation turns, oldest first
    #[serde(default)]
    #[validate(length(max = 50))]
    pub history: Vec<ChatTurn>,
}

/// Answer a question in one response
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    validate(&request)?;

    let response = state.router.ask(&request.question, &request.history).await;
    Ok(Json(response))
}

/// Stream an answer.
///
/// Emits `fragment` events followed by exactly one `done`, `failed` or
/// `cancelled` event. A client disconnect drops the stream, which cancels
/// the answer.
pub async fn ask_stream(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    validate(&request)?;

    let answers = state
        .router
        .ask_streaming(request.question, request.history);
    let events = answers.map(|event| Ok(sse_event(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// SSE event name for an answer event
pub fn event_name(event: &AnswerEvent) -> &'static str {
    match event {
        AnswerEvent::Fragment { .. } => "fragment",
        AnswerEvent::Completed { .. } => "done",
        AnswerEvent::Failed { .. } => "failed",
        AnswerEvent::Cancelled => "cancelled",
    }
}

fn sse_event(event: &AnswerEvent) -> Event {
    let base = Event::default().event(event_name(event));
    // JSON keeps multi-line fragments on a single data line
    match serde_json::to_string(event) {
        Ok(json) => base.data(json),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode answer event");
            base.data("{}")
        }
    }
}
