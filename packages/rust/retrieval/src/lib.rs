//! Retrieval pipeline core: topic classification, relevance gating,
//! listwise reranking, the real-time ingestion fallback, and the
//! orchestrator tying them together, plus batch seeding and refresh.

pub mod orchestrator;
pub mod rank;
pub mod realtime;
pub mod seed;
pub mod topic;

pub use orchestrator::Retriever;
pub use rank::{CANDIDATE_LIMIT, FINAL_PASSAGE_COUNT, RELEVANCE_THRESHOLD, Reranker};
pub use realtime::{IngestLimits, RealtimeIngestor};
pub use seed::{
    RefreshReport, SeedOptions, SeedProgress, SeedReport, SilentSeedProgress, default_seed_urls,
    refresh_passages, seed_passages,
};
pub use topic::classify;
