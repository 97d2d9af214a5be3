//! Regulatory and scientific intelligence aggregation across public drug,
//! device and literature registries.

pub mod aggregate;
pub mod cascade;
pub mod classify;
pub mod commands;
pub mod config;
pub mod extract;
pub mod harvest;
mod markdown;
pub mod registry;
pub mod regulation;
pub mod retry;
pub mod synonyms;

pub const USER_AGENT: &str = concat!("regintel/", env!("CARGO_PKG_VERSION"));

pub use aggregate::{Aggregator, Expansion, SearchOptions, UnifiedResult};
pub use classify::{Classification, EntityType, SearchTerm, classify};
pub use config::Settings;
pub use extract::{Extraction, extract_facts};
pub use synonyms::{SynonymCandidate, resolve_synonyms};
