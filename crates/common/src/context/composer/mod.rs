//! Answer composition adapters
//!
//! The router never writes prose itself. It hands the question, the prior
//! conversation and either ranked passages or a structured fact sheet to a
//! [`Composer`], which returns the answer text whole or as a fragment stream.

mod chat;
mod extractive;

pub use chat::ChatComposer;
pub use extractive::ExtractiveComposer;

use crate::config::ComposerConfig;
use crate::errors::{AppError, Result};
use crate::models::ChatTurn;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One ranked passage handed to the composer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPassage {
    /// Provenance tag of the source the passage came from
    pub source: String,

    /// Item id within the source
    pub reference: String,

    pub title: String,
    pub content: String,
    pub score: f32,
}

/// Grounding material for one answer
#[derive(Debug, Clone, PartialEq)]
pub enum ComposerContext {
    /// Generalist path: aggregated passages, best first
    Retrieved(Vec<ContextPassage>),
    /// Specialist path: rendered fact sheet
    FactSheet(String),
}

#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub question: String,
    pub history: Vec<ChatTurn>,
    pub context: ComposerContext,
}

/// Fragment stream produced by [`Composer::compose_stream`]
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Composer: Send + Sync {
    /// Produce the complete answer
    async fn compose(&self, request: &CompositionRequest) -> Result<String>;

    /// Produce the answer incrementally. The default emits the full answer as one fragment.
    async fn compose_stream(&self, request: &CompositionRequest) -> Result<FragmentStream> {
        let answer = self.compose(request).await?;
        Ok(stream::once(async move { Ok(answer) }).boxed())
    }

    fn name(&self) -> &str;
}

/// Build the configured composer
pub fn create_composer(config: &ComposerConfig) -> Result<Arc<dyn Composer>> {
    match config.provider.as_str() {
        "openai" | "chat" => Ok(Arc::new(ChatComposer::new(config.clone())?)),
        "extractive" => Ok(Arc::new(ExtractiveComposer::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown composer provider: {}", other),
        }),
    }
}

/// Render the grounding prompt shared by model-backed composers
pub fn build_prompt(request: &CompositionRequest) -> String {
    let mut prompt = String::from(
        "Answer the question using ONLY the context below. \
         If the context does not contain the answer, say so. Do not make up information.\n",
    );

    match &request.context {
        ComposerContext::Retrieved(passages) => {
            prompt.push_str(
                "Cite passages inline as [1], [2], etc. using the numbers shown.\n\nContext:\n",
            );
            if passages.is_empty() {
                prompt.push_str("\n(no relevant passages were found)\n");
            }
            for (i, passage) in passages.iter().enumerate() {
                prompt.push_str(&format!(
                    "\n[{}] {} ({}, relevance {:.2})\n{}\n",
                    i + 1,
                    passage.title,
                    passage.source,
                    passage.score,
                    passage.content
                ));
            }
        }
        ComposerContext::FactSheet(sheet) => {
            prompt.push_str("\nFacts:\n");
            prompt.push_str(sheet);
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!("\nQuestion: {}\n\nAnswer:", request.question));
    prompt
}

/// 1-based passage markers such as `[2]` referenced in an answer, in first-seen order
pub fn referenced_passages(answer: &str, passage_count: usize) -> Vec<usize> {
    let mut found = Vec::new();
    let mut rest = answer;

    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else { break };
        if let Ok(index) = rest[..close].trim().parse::<usize>() {
            if (1..=passage_count).contains(&index) && !found.contains(&index) {
                found.push(index);
            }
        }
        rest = &rest[close + 1..];
    }

    found
}
