//! Relevance gating and listwise reranking of search candidates.
//!
//! The gate runs over one search call's candidates (requested with a
//! generous limit) and applies, in order: keep candidates at or above the
//! relevance threshold; if none qualify, fall back to the top candidates by
//! raw similarity so the caller always gets *something* when the store
//! returned anything; if more than the final fan-out qualify, make exactly
//! one reranking call to pick the best subset. The reranking judgment is
//! delegated to a chat model prompted for a fixed-format numeric ranking;
//! any failure there degrades to similarity-order truncation, never to an
//! empty result.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use hrlex_shared::{CandidatePassage, HrlexError, Result};

/// Candidate limit for the initial similarity search.
pub const CANDIDATE_LIMIT: usize = 12;

/// Minimum similarity for a candidate to be considered relevant.
pub const RELEVANCE_THRESHOLD: f32 = 0.7;

/// Final fan-out: the most passages one retrieval request returns.
pub const FINAL_PASSAGE_COUNT: usize = 6;

/// Content excerpt length shown to the ranking model per candidate.
const EXCERPT_CHARS: usize = 200;

/// User-Agent string for ranking requests.
const USER_AGENT: &str = concat!("hrlex/", env!("CARGO_PKG_VERSION"));

/// Timeout for ranking calls.
const RANKING_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Filter and reorder `candidates` (assumed sorted by similarity, highest
/// first) down to at most [`FINAL_PASSAGE_COUNT`] passages.
///
/// Makes at most one reranking call, and only when more than the fan-out
/// size passed the threshold.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub async fn gate_and_rerank(
    reranker: &Reranker,
    query: &str,
    candidates: Vec<CandidatePassage>,
) -> Vec<CandidatePassage> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let passing: Vec<CandidatePassage> = candidates
        .iter()
        .filter(|c| c.similarity >= RELEVANCE_THRESHOLD)
        .cloned()
        .collect();

    if passing.is_empty() {
        debug!("no candidate passed threshold, degrading to top-N by similarity");
        return candidates
            .into_iter()
            .take(FINAL_PASSAGE_COUNT)
            .collect();
    }

    if passing.len() > FINAL_PASSAGE_COUNT {
        let indices = reranker
            .select(query, &passing, FINAL_PASSAGE_COUNT)
            .await;
        return indices
            .into_iter()
            .filter_map(|i| passing.get(i).cloned())
            .collect();
    }

    passing
}

// ---------------------------------------------------------------------------
// Reranker
// ---------------------------------------------------------------------------

/// Listwise reranker backed by an OpenAI-compatible chat model.
pub struct Reranker {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl Reranker {
    /// Build a reranker against `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(RANKING_TIMEOUT_SECS))
            .build()
            .map_err(|e| HrlexError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Pick the indices of the best `top_k` candidates for `query`.
    ///
    /// Never returns an empty selection for non-empty input: if the ranking
    /// call fails or yields nothing usable, the first `top_k` candidates by
    /// similarity are selected instead (deterministic degradation).
    pub async fn select(
        &self,
        query: &str,
        candidates: &[CandidatePassage],
        top_k: usize,
    ) -> Vec<usize> {
        if candidates.is_empty() {
            return Vec::new();
        }

        match self.request_ranking(query, candidates, top_k).await {
            Ok(indices) if !indices.is_empty() => indices,
            Ok(_) => {
                warn!("ranking response contained no usable indices, using similarity order");
                (0..top_k.min(candidates.len())).collect()
            }
            Err(e) => {
                warn!(error = %e, "reranking unavailable, using similarity order");
                (0..top_k.min(candidates.len())).collect()
            }
        }
    }

    /// Make the ranking call and parse its numeric answer.
    async fn request_ranking(
        &self,
        query: &str,
        candidates: &[CandidatePassage],
        top_k: usize,
    ) -> Result<Vec<usize>> {
        let prompt = build_ranking_prompt(query, candidates, top_k);

        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            max_tokens: 50,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| HrlexError::Reranking(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".into());
            return Err(HrlexError::Reranking(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| HrlexError::Reranking(format!("invalid response body: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(parse_ranking(&content, candidates.len(), top_k))
    }
}

/// Build the fixed-format ranking prompt listing every candidate.
fn build_ranking_prompt(query: &str, candidates: &[CandidatePassage], top_k: usize) -> String {
    let mut listing = String::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let excerpt: String = candidate.record.content.chars().take(EXCERPT_CHARS).collect();
        listing.push_str(&format!(
            "\n{}. {} - {}\n{excerpt}...\n",
            i + 1,
            candidate.record.title,
            candidate.record.section,
        ));
    }

    format!(
        "Given this query: \"{query}\"\n\n\
         Rank these documents by relevance (1 = most relevant):\n{listing}\n\
         Return only the numbers of the top {top_k} most relevant documents \
         as a comma-separated list."
    )
}

/// Parse a comma-separated 1-based ranking into 0-based indices.
///
/// Non-numeric entries and out-of-range indices are discarded, duplicates
/// keep their first position, and the result is truncated to `top_k`.
fn parse_ranking(content: &str, candidate_count: usize, top_k: usize) -> Vec<usize> {
    let mut seen = Vec::new();
    for part in content.split(',') {
        let Ok(number) = part.trim().parse::<usize>() else {
            continue;
        };
        if number == 0 || number > candidate_count {
            continue;
        }
        let index = number - 1;
        if !seen.contains(&index) {
            seen.push(index);
        }
        if seen.len() == top_k {
            break;
        }
    }
    seen
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hrlex_shared::{Jurisdiction, PassageRecord, Topic};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidate(index: usize, similarity: f32) -> CandidatePassage {
        CandidatePassage {
            record: PassageRecord {
                id: format!("id-{index:02}"),
                title: format!("Document {index}"),
                url: format!("https://www.gov.uk/doc-{index}"),
                jurisdiction: Jurisdiction::default(),
                topic: Some(Topic::Holiday),
                section: format!("Section {index}"),
                content: format!("Content for document {index}."),
                last_refreshed_at: Utc::now(),
                embedding: vec![0.0; 4],
            },
            similarity,
        }
    }

    fn candidates(similarities: &[f32]) -> Vec<CandidatePassage> {
        similarities
            .iter()
            .enumerate()
            .map(|(i, &s)| candidate(i, s))
            .collect()
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    async fn reranker_for(server: &MockServer) -> Reranker {
        Reranker::new(&server.uri(), "test-key", "test-model").unwrap()
    }

    // --- parse_ranking ---

    #[test]
    fn parse_ranking_filters_and_truncates() {
        assert_eq!(parse_ranking("3, 1, 2", 5, 6), vec![2, 0, 1]);
        assert_eq!(parse_ranking("3, 1, 2, 4, 5", 5, 2), vec![2, 0]);
        // Out-of-range, zero, and non-numeric entries are discarded.
        assert_eq!(parse_ranking("99, x, 0, 2", 5, 6), vec![1]);
        // Duplicates keep their first position.
        assert_eq!(parse_ranking("2, 2, 1", 5, 6), vec![1, 0]);
        assert!(parse_ranking("no numbers here", 5, 6).is_empty());
        assert!(parse_ranking("", 5, 6).is_empty());
    }

    // --- gate policy ---

    #[tokio::test]
    async fn gate_keeps_passing_candidates_without_reranking() {
        let server = MockServer::start().await;
        // 5 of 8 pass the threshold; 5 <= 6, so no ranking call may be made.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("1")))
            .expect(0)
            .mount(&server)
            .await;

        let reranker = reranker_for(&server).await;
        let input = candidates(&[0.91, 0.85, 0.8, 0.75, 0.72, 0.68, 0.6, 0.4]);
        let result = gate_and_rerank(&reranker, "What holiday entitlement rules apply?", input).await;

        assert_eq!(result.len(), 5);
        let sims: Vec<f32> = result.iter().map(|c| c.similarity).collect();
        assert_eq!(sims, vec![0.91, 0.85, 0.8, 0.75, 0.72]);
    }

    #[tokio::test]
    async fn gate_degrades_to_top_six_when_nothing_passes() {
        let server = MockServer::start().await;
        let reranker = reranker_for(&server).await;

        let input = candidates(&[0.65, 0.6, 0.55, 0.5, 0.45, 0.4, 0.35, 0.3]);
        let result = gate_and_rerank(&reranker, "obscure niche topic", input).await;

        assert_eq!(result.len(), FINAL_PASSAGE_COUNT);
        assert_eq!(result[0].similarity, 0.65);
        assert!(result.iter().all(|c| c.similarity < RELEVANCE_THRESHOLD));
    }

    #[tokio::test]
    async fn gate_reranks_when_more_than_six_pass() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body("7, 2, 1, 3, 4, 5")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reranker = reranker_for(&server).await;
        let input = candidates(&[0.95, 0.92, 0.9, 0.88, 0.85, 0.8, 0.75, 0.72]);
        let result = gate_and_rerank(&reranker, "holiday pay", input).await;

        assert_eq!(result.len(), 6);
        // The model put candidate 7 (index 6) first.
        assert_eq!(result[0].record.id, "id-06");
        assert_eq!(result[1].record.id, "id-01");
    }

    #[tokio::test]
    async fn gate_empty_input_is_empty_output() {
        let server = MockServer::start().await;
        let reranker = reranker_for(&server).await;
        let result = gate_and_rerank(&reranker, "anything", Vec::new()).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn gate_never_exceeds_fan_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_body("1,2,3,4,5,6,7,8,9,10,11,12")),
            )
            .mount(&server)
            .await;

        let reranker = reranker_for(&server).await;
        let input = candidates(&[0.9; 12]);
        let result = gate_and_rerank(&reranker, "everything relevant", input).await;

        assert_eq!(result.len(), FINAL_PASSAGE_COUNT);
    }

    // --- reranker degradation ---

    #[tokio::test]
    async fn select_degrades_on_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let reranker = reranker_for(&server).await;
        let input = candidates(&[0.9, 0.85, 0.8, 0.78, 0.75, 0.73, 0.71]);
        let selected = reranker.select("holiday", &input, 6).await;

        // Deterministic subset: the first six by similarity.
        assert_eq!(selected, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn select_degrades_on_unparsable_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_body("I cannot rank these documents.")),
            )
            .mount(&server)
            .await;

        let reranker = reranker_for(&server).await;
        let input = candidates(&[0.9, 0.85, 0.8]);
        let selected = reranker.select("holiday", &input, 6).await;

        assert_eq!(selected, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn select_empty_input_is_empty() {
        let server = MockServer::start().await;
        let reranker = reranker_for(&server).await;
        assert!(reranker.select("query", &[], 6).await.is_empty());
    }

    #[test]
    fn prompt_lists_candidates_with_excerpts() {
        let input = candidates(&[0.9, 0.8]);
        let prompt = build_ranking_prompt("holiday pay", &input, 6);

        assert!(prompt.contains("Given this query: \"holiday pay\""));
        assert!(prompt.contains("1. Document 0 - Section 0"));
        assert!(prompt.contains("2. Document 1 - Section 1"));
        assert!(prompt.contains("comma-separated list"));
    }
}
