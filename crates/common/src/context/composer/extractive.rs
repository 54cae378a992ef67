//! Offline composer that answers by quoting the grounding material
//!
//! Used when no chat model is configured, and in tests.

use super::{Composer, ComposerContext, CompositionRequest, FragmentStream};
use crate::errors::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

const SNIPPET_CHARS: usize = 240;

pub const NO_CONTEXT_ANSWER: &str =
    "I could not find anything relevant to that question in the knowledge sources.";

#[derive(Debug, Clone, Default)]
pub struct ExtractiveComposer;

impl ExtractiveComposer {
    pub fn new() -> Self {
        Self
    }

    /// Answer lines; streaming emits one fragment per line
    fn lines(&self, request: &CompositionRequest) -> Vec<String> {
        match &request.context {
            ComposerContext::Retrieved(passages) if passages.is_empty() => {
                vec![NO_CONTEXT_ANSWER.to_string()]
            }
            ComposerContext::Retrieved(passages) => {
                let mut lines = vec![format!("Here is what I found for \"{}\":\n", request.question)];
                lines.extend(passages.iter().enumerate().map(|(i, p)| {
                    format!("\n[{}] {}: {}", i + 1, p.title, snippet(&p.content))
                }));
                lines
            }
            ComposerContext::FactSheet(sheet) => vec![sheet.clone()],
        }
    }
}

fn snippet(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    match cut.rfind(' ') {
        Some(pos) => format!("{}...", &cut[..pos]),
        None => format!("{}...", cut),
    }
}

#[async_trait]
impl Composer for ExtractiveComposer {
    async fn compose(&self, request: &CompositionRequest) -> Result<String> {
        Ok(self.lines(request).concat())
    }

    async fn compose_stream(&self, request: &CompositionRequest) -> Result<FragmentStream> {
        let lines = self.lines(request);
        Ok(stream::iter(lines.into_iter().map(Ok)).boxed())
    }

    fn name(&self) -> &str {
        "extractive"
    }
}
