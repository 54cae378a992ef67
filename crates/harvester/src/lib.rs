//! Switchyard Harvester
//!
//! Periodically pulls candidate facts from an external feed, keeps the ones
//! that look like solutions and appends them to a knowledge source. Already
//! processed identifiers are persisted so reruns never duplicate facts.

pub mod errors;
pub mod extract;
pub mod job;
pub mod source;
pub mod state;

pub use errors::{HarvestError, Result};
pub use job::{HarvestJob, HarvestReport};
pub use source::{FactSource, HarvestCandidate, HttpFeedSource, MemoryFactSource};
pub use state::{ProcessedSet, StateFile};
