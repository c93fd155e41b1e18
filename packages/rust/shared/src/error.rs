//! Error types for the hrlex pipeline.
//!
//! Library crates use [`HrlexError`] via `thiserror`; the CLI wraps it with
//! `color-eyre` for rich diagnostics. The retrieval layer distinguishes
//! item-scoped failures (one URL, one chunk) from request-fatal ones: only
//! malformed caller input is ever fatal to a retrieval request.

use std::path::PathBuf;

/// Top-level error type for all hrlex operations.
#[derive(Debug, thiserror::Error)]
pub enum HrlexError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the more specific variants below.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream embedding call failed. Fatal to the enclosing chunk or
    /// query-embedding step, never to the surrounding batch.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// Vector store query failed; the retrieval layer degrades this to an
    /// empty candidate set.
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    /// Page fetch or content derivation failed; the affected URL is skipped.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Ranking call failed or returned nothing usable; callers degrade to
    /// similarity-order truncation.
    #[error("reranking unavailable: {0}")]
    Reranking(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Data validation error (malformed input, dimension mismatch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HrlexError>;

impl HrlexError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an extraction error from any displayable message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
