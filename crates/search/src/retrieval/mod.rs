//! Ranked results and cross-source aggregation
//!
//! Ordering rules shared by connectors and the aggregator:
//! - Results scored from a valid embedding come before unscored ones
//! - Higher score first
//! - Ties broken by source priority, then item id ascending

mod aggregator;

pub use aggregator::{AggregatedResults, Aggregator, SourcePriority, SourceReport, SourceStatus};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use switchyard_common::models::KnowledgeItem;

/// One ranked hit with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matched item, without its embedding vector
    pub item: KnowledgeItem,

    /// Cosine similarity; 0 when unscored
    pub score: f32,

    /// Provenance tag of the producing source
    pub source: String,

    /// Whether the score came from valid query and item embeddings
    pub scored: bool,
}

impl SearchResult {
    pub fn new(item: &KnowledgeItem, source: &str, score: f32, scored: bool) -> Self {
        let mut item = item.clone();
        item.embedding = None;
        Self {
            item,
            score: if scored { score } else { 0.0 },
            source: source.to_string(),
            scored,
        }
    }
}

/// Scored before unscored, then score descending
pub(crate) fn by_rank(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.scored
        .cmp(&a.scored)
        .then_with(|| b.score.total_cmp(&a.score))
}

/// Full ordering within one source: rank, then id ascending
pub(crate) fn by_rank_then_id(a: &SearchResult, b: &SearchResult) -> Ordering {
    by_rank(a, b).then_with(|| a.item.id.cmp(&b.item.id))
}
