//! Retrieval orchestration: primary search, relevance gating, and the
//! real-time fallback, composed as an explicit state machine.
//!
//! `Searching → Done` when the primary path yields passages;
//! `Searching → FallbackIngesting → Researching → Done` when it comes up
//! empty and the fallback stores new content;
//! `Searching → FallbackIngesting → Done` when the fallback stores nothing.
//!
//! The orchestrator never fails for "no knowledge found"; that is an empty
//! passage list, and the answer-generation collaborator decides how to
//! refuse. Only malformed caller input is a request-level error.

use tracing::{debug, info, instrument, warn};

use hrlex_embeddings::EmbeddingClient;
use hrlex_shared::{
    CandidatePassage, ContextPassage, HrlexError, Jurisdiction, Result, RetrievalFilters,
    RetrievalOutcome, Topic,
};
use hrlex_storage::PassageStore;

use crate::rank::{CANDIDATE_LIMIT, Reranker, gate_and_rerank};
use crate::realtime::RealtimeIngestor;

/// Phases of one retrieval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Searching,
    FallbackIngesting,
    Researching,
    Done,
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// Entry point composing the store, embedder, reranker, and fallback into
/// the final ranked passage list.
///
/// All collaborators are injected at construction: no global clients, and
/// the whole pipeline is testable against local fakes.
pub struct Retriever {
    store: PassageStore,
    embeddings: EmbeddingClient,
    reranker: Reranker,
    ingestor: RealtimeIngestor,
    jurisdiction: Jurisdiction,
}

impl Retriever {
    pub fn new(
        store: PassageStore,
        embeddings: EmbeddingClient,
        reranker: Reranker,
        ingestor: RealtimeIngestor,
        jurisdiction: Jurisdiction,
    ) -> Self {
        Self {
            store,
            embeddings,
            reranker,
            ingestor,
            jurisdiction,
        }
    }

    /// Retrieve up to six relevant passages for `query`.
    ///
    /// `topic` narrows the search when given; otherwise the keyword
    /// classifier resolves one only for the fallback's ingestion labels.
    /// The returned flag records whether the fallback stored new content
    /// and the re-query ran; it never alters ranking.
    #[instrument(skip(self), fields(query = %query, topic = ?topic))]
    pub async fn retrieve(&self, query: &str, topic: Option<Topic>) -> Result<RetrievalOutcome> {
        if query.trim().is_empty() {
            return Err(HrlexError::validation("query text is required"));
        }

        let mut phase = Phase::Searching;
        let mut used_fallback = false;
        let mut passages: Vec<CandidatePassage> = Vec::new();

        loop {
            match phase {
                Phase::Searching => {
                    passages = self.primary_search(query, topic).await;
                    phase = if passages.is_empty() {
                        info!("primary retrieval empty, entering fallback");
                        Phase::FallbackIngesting
                    } else {
                        Phase::Done
                    };
                }
                Phase::FallbackIngesting => {
                    // Any failure inside the fallback counts as "ingested
                    // nothing", never as a fatal error.
                    let stored = match self
                        .ingestor
                        .ingest_for_query(&self.store, query, topic)
                        .await
                    {
                        Ok(records) => records,
                        Err(e) => {
                            warn!(error = %e, "fallback ingestion failed");
                            Vec::new()
                        }
                    };

                    phase = if stored.is_empty() {
                        Phase::Done
                    } else {
                        used_fallback = true;
                        Phase::Researching
                    };
                }
                Phase::Researching => {
                    // Re-run the primary path exactly once so new rows go
                    // through the normal ranking; whatever it yields is
                    // final, even if still empty.
                    passages = self.primary_search(query, topic).await;
                    phase = Phase::Done;
                }
                Phase::Done => break,
            }
        }

        debug!(
            passages = passages.len(),
            used_fallback, "retrieval complete"
        );

        Ok(RetrievalOutcome {
            passages: passages
                .iter()
                .map(|c| ContextPassage::from(&c.record))
                .collect(),
            used_realtime_fallback: used_fallback,
        })
    }

    /// Embed the query, search the store, and apply the relevance gate.
    ///
    /// Query-embedding or search failures degrade to an empty candidate set
    /// (logged here); they must not abort the request, since the fallback
    /// may still recover it.
    async fn primary_search(&self, query: &str, topic: Option<Topic>) -> Vec<CandidatePassage> {
        let filters = RetrievalFilters {
            jurisdiction: self.jurisdiction.clone(),
            topic,
        };

        let embedded = match self.embeddings.embed(query).await {
            Ok(embedded) => embedded,
            Err(e) => {
                warn!(error = %e, "query embedding failed, degrading to empty result");
                return Vec::new();
            }
        };

        let candidates = match self
            .store
            .search(&embedded.embedding, &filters, CANDIDATE_LIMIT)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "search unavailable, degrading to empty result");
                Vec::new()
            }
        };

        gate_and_rerank(&self.reranker, query, candidates).await
    }
}
