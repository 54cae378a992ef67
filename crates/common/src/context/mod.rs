//! Query-side building blocks shared by the router and the gateway
//!
//! - Specialist lookup table
//! - Rule-table query classifier
//! - Answer composer adapters

pub mod classifier;
pub mod composer;
pub mod lookup;

pub use classifier::{ClassificationResult, Confidence, QueryClassifier, Route};
pub use composer::{
    create_composer, ChatComposer, Composer, ComposerContext, CompositionRequest, ContextPassage,
    ExtractiveComposer, FragmentStream,
};
pub use lookup::{CrossReference, EntityLookup, LookupEntity, LookupTable};
