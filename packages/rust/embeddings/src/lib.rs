//! OpenAI-compatible embeddings client.
//!
//! Turns text into fixed-dimension vectors with token-usage accounting.
//! Failures are surfaced as [`HrlexError::Embedding`] and never retried
//! internally: callers decide what a failed embedding means for the
//! surrounding ingestion step, so partial-ingestion state stays visible.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use hrlex_shared::{HrlexError, Result};

/// User-Agent string for embedding requests.
const USER_AGENT: &str = concat!("hrlex/", env!("CARGO_PKG_VERSION"));

/// Default timeout for embedding calls.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Token usage reported by the embedding service for one input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: f64,
    pub total_tokens: f64,
}

/// One embedded input: the vector plus its share of the usage accounting.
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    pub embedding: Vec<f32>,
    pub usage: EmbeddingUsage,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    /// Build a new embedding client against `base_url` (e.g.
    /// `https://api.openai.com/v1`).
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(HrlexError::config("missing embedding API key"));
        }
        if dimensions == 0 {
            return Err(HrlexError::validation("embedding dimensions must be non-zero"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| HrlexError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            dimensions,
        })
    }

    /// The dimensionality every returned vector will have.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<EmbeddedText> {
        let mut results = self.embed_batch(std::slice::from_ref(&text)).await?;
        results
            .pop()
            .ok_or_else(|| HrlexError::Embedding("service returned no embedding".into()))
    }

    /// Embed a batch of texts, one vector per input, in input order.
    ///
    /// The service reports usage per request; it is split evenly across the
    /// batch so per-chunk accounting stays additive.
    #[instrument(skip_all, fields(inputs = texts.len()))]
    pub async fn embed_batch<T: AsRef<str>>(&self, texts: &[T]) -> Result<Vec<EmbeddedText>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<&str> = texts.iter().map(|t| t.as_ref()).collect();
        let request = EmbeddingRequest {
            model: &self.model,
            input: &inputs,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| HrlexError::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".into());
            return Err(HrlexError::Embedding(format!("HTTP {status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| HrlexError::Embedding(format!("invalid response body: {e}")))?;

        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(HrlexError::Embedding(format!(
                "service returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        let per_input = inputs.len() as f64;
        let usage = EmbeddingUsage {
            prompt_tokens: parsed.usage.prompt_tokens as f64 / per_input,
            total_tokens: parsed.usage.total_tokens as f64 / per_input,
        };

        debug!(
            inputs = inputs.len(),
            total_tokens = parsed.usage.total_tokens,
            "embedded batch"
        );

        parsed
            .data
            .into_iter()
            .map(|entry| {
                if entry.embedding.len() != self.dimensions {
                    return Err(HrlexError::Embedding(format!(
                        "service returned {}-dimension vector, expected {}",
                        entry.embedding.len(),
                        self.dimensions
                    )));
                }
                Ok(EmbeddedText {
                    embedding: entry.embedding,
                    usage,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
    usage: UsageEntry,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct UsageEntry {
    prompt_tokens: u64,
    total_tokens: u64,
}
