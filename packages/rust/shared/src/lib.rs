//! Shared types, error model, and configuration for hrlex.
//!
//! This crate is the foundation depended on by all other hrlex crates.
//! It provides:
//! - [`HrlexError`], the unified error type
//! - Domain types ([`PassageRecord`], [`CandidatePassage`], [`Topic`],
//!   [`Jurisdiction`], [`ChunkUnit`], [`RetrievalFilters`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, IngestConfig, OpenAiConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, resolve_api_key, validate_api_key,
};
pub use error::{HrlexError, Result};
pub use types::{
    CandidatePassage, ChunkUnit, ContextPassage, DEFAULT_EMBEDDING_DIMENSIONS, Jurisdiction,
    PassageRecord, RetrievalFilters, RetrievalOutcome, SeedUrl, Topic,
};
