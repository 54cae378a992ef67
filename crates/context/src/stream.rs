//! Streaming answer events
//!
//! An [`AnswerStream`] yields zero or more fragments followed by exactly one
//! terminal event. Dropping the stream cancels the work behind it.

use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use switchyard_common::cancellation::{CancellationToken, DropGuard};
use switchyard_common::context::Route;
use switchyard_common::models::Citation;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnswerEvent {
    /// Incremental answer text
    Fragment { text: String },
    Completed {
        cited_sources: Vec<Citation>,
        route: Route,
    },
    /// Carries the safe fallback message
    Failed { message: String },
    Cancelled,
}

impl AnswerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnswerEvent::Fragment { .. })
    }
}

pub struct AnswerStream {
    events: ReceiverStream<AnswerEvent>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl AnswerStream {
    pub(crate) fn new(rx: mpsc::Receiver<AnswerEvent>, token: CancellationToken) -> Self {
        Self {
            events: ReceiverStream::new(rx),
            _guard: DropGuard::new(token.clone()),
            token,
        }
    }

    /// Stop the answer; the stream then ends with `Cancelled`
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Drain the stream into the concatenated text and the terminal event
    pub async fn collect_answer(mut self) -> (String, Option<AnswerEvent>) {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                AnswerEvent::Fragment { text: fragment } => text.push_str(&fragment),
                terminal => return (text, Some(terminal)),
            }
        }
        (text, None)
    }
}

impl Stream for AnswerStream {
    type Item = AnswerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let fragment = serde_json::to_value(AnswerEvent::Fragment {
            text: "Open the portal".to_string(),
        })
        .unwrap();
        assert_eq!(fragment["event"], "fragment");
        assert_eq!(fragment["text"], "Open the portal");

        let cancelled = serde_json::to_value(AnswerEvent::Cancelled).unwrap();
        assert_eq!(cancelled, serde_json::json!({ "event": "cancelled" }));
        assert!(AnswerEvent::Cancelled.is_terminal());
    }

    #[tokio::test]
    async fn test_collect_answer_stops_at_terminal() {
        let (tx, rx) = mpsc::channel(4);
        let stream = AnswerStream::new(rx, CancellationToken::new());
        tx.send(AnswerEvent::Fragment { text: "a".to_string() }).await.unwrap();
        tx.send(AnswerEvent::Fragment { text: "b".to_string() }).await.unwrap();
        tx.send(AnswerEvent::Failed { message: "x".to_string() }).await.unwrap();
        drop(tx);

        let (text, terminal) = stream.collect_answer().await;
        assert_eq!(text, "ab");
        assert!(matches!(terminal, Some(AnswerEvent::Failed { .. })));
    }
}
