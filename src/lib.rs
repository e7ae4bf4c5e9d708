//! Tiered medical entity extraction.
//!
//! [`HybridCoordinator`] answers every request immediately from a curated
//! dictionary while a concept database and a full entity model load in the
//! background, then upgrades requests to the best tier that is ready.
//! [`SharedResourceCache`] holds the heavy artefacts used by retrieval.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod nlp;
pub mod resources;

pub use nlp::{
    hybrid::{HybridCoordinator, Status, TierState, Tiers},
    Category, Entities, ExtractMode, ExtractionResult, Tier,
};
pub use resources::SharedResourceCache;
