//! Switchyard Context
//!
//! The agent router that sits between a chat question and the knowledge
//! sources:
//! - Query classification (generalist vs specialist)
//! - Aggregated retrieval or structured fact sheets
//! - Single-shot and streaming answers with explicit terminal events

pub mod fact_sheet;
pub mod router;
pub mod stream;

pub use fact_sheet::FactSheet;
pub use router::{AskResponse, Router, RouterContext};
pub use stream::{AnswerEvent, AnswerStream};
