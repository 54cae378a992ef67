//! OpenAI-compatible chat completions composer

use super::{build_prompt, Composer, CompositionRequest, FragmentStream};
use crate::config::ComposerConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, instrument};

const SYSTEM_PROMPT: &str =
    "You are a support assistant. Answer from the provided context and keep answers short.";

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChunkResponse {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatComposer {
    config: ComposerConfig,
    client: reqwest::Client,
}

impl ChatComposer {
    pub fn new(config: ComposerConfig) -> Result<Self> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::Configuration {
                message: "composer.api_key is required for the chat composer".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }

    fn messages(&self, request: &CompositionRequest) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        }];
        messages.extend(request.history.iter().map(|turn| ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }));
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: build_prompt(request),
        });
        messages
    }

    async fn send(&self, request: &CompositionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: self.messages(request),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::CompositionError {
                message: format!("Chat API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CompositionError {
                message: format!("Chat API error {}: {}", status, body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Composer for ChatComposer {
    #[instrument(skip(self, request), fields(model = %self.config.model))]
    async fn compose(&self, request: &CompositionRequest) -> Result<String> {
        let response = self.send(request, false).await?;
        let parsed: ChatResponse =
            response.json().await.map_err(|e| AppError::CompositionError {
                message: format!("Failed to parse chat response: {}", e),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::CompositionError {
                message: "Empty response from chat API".to_string(),
            })
    }

    async fn compose_stream(&self, request: &CompositionRequest) -> Result<FragmentStream> {
        let response = self.send(request, true).await?;
        debug!(model = %self.config.model, "Chat stream opened");
        Ok(sse_fragments(response.bytes_stream()).boxed())
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

struct SseState<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    done: bool,
}

impl<S> SseState<S> {
    /// Parse every complete line in the buffer
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.parse_line(&String::from_utf8_lossy(&line));
            if self.done {
                self.buffer.clear();
                return;
            }
        }
    }

    fn parse_line(&mut self, line: &str) {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        match serde_json::from_str::<ChunkResponse>(data) {
            Ok(chunk) => {
                let text: String = chunk
                    .choices
                    .into_iter()
                    .filter_map(|c| c.delta.content)
                    .collect();
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
            }
            Err(e) => {
                self.pending.push_back(Err(AppError::CompositionError {
                    message: format!("Malformed stream chunk: {}", e),
                }));
                self.done = true;
            }
        }
    }
}

/// Turn a server-sent-events byte stream into content fragments
pub(crate) fn sse_fragments<S, B>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((
                        Err(AppError::CompositionError {
                            message: format!("Chat stream interrupted: {}", e),
                        }),
                        state,
                    ));
                }
                None => {
                    state.buffer.push(b'\n');
                    state.drain_lines();
                    state.done = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = reqwest::Result<Vec<u8>>> + Unpin + Send {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_sse_fragments_across_chunk_boundaries() {
        let body = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Open \"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"the portal\"}}]}\n\n",
            ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{}}]}\n\n",
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        ]);

        let fragments: Vec<String> = sse_fragments(body)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Open ".to_string(), "the portal".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_malformed_chunk_is_error() {
        let body = chunks(&["data: {not json}\n"]);
        let items: Vec<Result<String>> = sse_fragments(body).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn test_requires_api_key() {
        assert!(ChatComposer::new(ComposerConfig::default()).is_err());

        let config = ComposerConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(ChatComposer::new(config).is_ok());
    }
}
