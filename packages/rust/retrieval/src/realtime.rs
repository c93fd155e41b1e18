//! Real-time ingestion fallback: discover, extract, chunk, embed, store.
//!
//! Triggered by the orchestrator only when primary retrieval yields nothing.
//! Discovery runs both sources concurrently; everything downstream is
//! deliberately sequential with explicit politeness delays toward upstream
//! sites and the embedding service. Failures are isolated at item scope: a
//! URL that fails extraction is skipped, a chunk that fails embedding or
//! storage is skipped, and sibling work always continues.

use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

use hrlex_chunk::{ChunkOptions, chunk_text};
use hrlex_discovery::{DiscoveredPage, DiscoveryClient};
use hrlex_embeddings::EmbeddingClient;
use hrlex_extract::Extractor;
use hrlex_shared::{IngestConfig, Jurisdiction, PassageRecord, Result, Topic};
use hrlex_storage::{NewPassage, PassageStore};

use crate::topic::classify;

// ---------------------------------------------------------------------------
// IngestLimits
// ---------------------------------------------------------------------------

/// Work caps and pacing for one fallback invocation.
#[derive(Debug, Clone)]
pub struct IngestLimits {
    /// Maximum new URLs fetched per invocation (cost/latency ceiling).
    pub max_urls: usize,
    /// Delay between URL fetches.
    pub url_delay: Duration,
    /// Delay between per-chunk embedding calls.
    pub embed_delay: Duration,
    /// Chunk size bound in characters.
    pub max_chunk_chars: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for IngestLimits {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_urls: config.max_realtime_urls,
            url_delay: Duration::from_millis(config.url_delay_ms),
            embed_delay: Duration::from_millis(config.embed_delay_ms),
            max_chunk_chars: config.max_chunk_chars,
        }
    }
}

// ---------------------------------------------------------------------------
// RealtimeIngestor
// ---------------------------------------------------------------------------

/// Orchestrates discovery → dedup → extract → chunk → embed → upsert for a
/// retrieval miss.
pub struct RealtimeIngestor {
    discovery: DiscoveryClient,
    extractor: Extractor,
    embeddings: EmbeddingClient,
    jurisdiction: Jurisdiction,
    limits: IngestLimits,
}

impl RealtimeIngestor {
    pub fn new(
        discovery: DiscoveryClient,
        extractor: Extractor,
        embeddings: EmbeddingClient,
        jurisdiction: Jurisdiction,
        limits: IngestLimits,
    ) -> Self {
        Self {
            discovery,
            extractor,
            embeddings,
            jurisdiction,
            limits,
        }
    }

    /// Discover and ingest fresh content for `query`, returning the newly
    /// stored records.
    ///
    /// Does not re-run the relevance gate: the caller re-invokes primary
    /// retrieval so new rows go through the normal ranking path.
    #[instrument(skip(self, store), fields(query = %query))]
    pub async fn ingest_for_query(
        &self,
        store: &PassageStore,
        query: &str,
        topic: Option<Topic>,
    ) -> Result<Vec<PassageRecord>> {
        let topic = topic.unwrap_or_else(|| classify(query));
        info!(%topic, "real-time ingestion triggered");

        let discovered = self.discovery.discover(query).await;
        if discovered.is_empty() {
            info!("no candidate URLs discovered");
            return Ok(Vec::new());
        }

        let mut stored: Vec<PassageRecord> = Vec::new();
        let mut fetched = 0usize;

        for page in &discovered {
            if fetched >= self.limits.max_urls {
                debug!(
                    cap = self.limits.max_urls,
                    "URL cap reached, stopping discovery processing"
                );
                break;
            }

            // Dedup before fetching: a page already in the store is never
            // re-fetched here, so no redundant fetch/embedding cost and no
            // clobbering of fresher rows with stale chunk boundaries.
            match store.exists_for_url(&page.url).await {
                Ok(true) => {
                    info!(url = %page.url, "already stored, skipping");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(url = %page.url, error = %e, "dedup check failed, skipping URL");
                    continue;
                }
            }

            if fetched > 0 && !self.limits.url_delay.is_zero() {
                sleep(self.limits.url_delay).await;
            }
            fetched += 1;

            match self.ingest_page(store, page, topic).await {
                Ok(mut records) => stored.append(&mut records),
                Err(e) => {
                    warn!(url = %page.url, error = %e, "failed to ingest URL, continuing");
                }
            }
        }

        info!(stored = stored.len(), "real-time ingestion complete");
        Ok(stored)
    }

    /// Extract, chunk, embed, and store a single discovered page.
    ///
    /// Chunk-level failures are logged and skipped; only fetch/extraction
    /// failure aborts the page.
    async fn ingest_page(
        &self,
        store: &PassageStore,
        page: &DiscoveredPage,
        topic: Topic,
    ) -> Result<Vec<PassageRecord>> {
        let url = Url::parse(&page.url)
            .map_err(|e| hrlex_shared::HrlexError::Extraction(format!("{}: {e}", page.url)))?;

        let article = self.extractor.fetch_and_extract(&url).await?;

        // Real-time pages always take the paragraph strategy; heading-based
        // chunking is reserved for curated seeding.
        let opts = ChunkOptions {
            max_chars: self.limits.max_chunk_chars,
        };
        let chunks = chunk_text(&article.main_text, &opts);

        let title = if article.title == "Untitled" && !page.title.is_empty() {
            page.title.clone()
        } else {
            article.title.clone()
        };

        let mut records = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.limits.embed_delay.is_zero() {
                sleep(self.limits.embed_delay).await;
            }

            let embedded = match self.embeddings.embed(&chunk.text).await {
                Ok(embedded) => embedded,
                Err(e) => {
                    warn!(url = %page.url, section = %chunk.label, error = %e,
                          "embedding failed, skipping chunk");
                    continue;
                }
            };

            let passage = NewPassage {
                title: title.clone(),
                url: page.url.clone(),
                jurisdiction: self.jurisdiction.clone(),
                topic: Some(topic),
                section: chunk.label.clone(),
                content: chunk.text.clone(),
                last_refreshed_at: Utc::now(),
                embedding: embedded.embedding,
            };

            match store.upsert(&passage).await {
                Ok(record) => {
                    debug!(section = %record.section, "real-time ingested chunk");
                    records.push(record);
                }
                Err(e) => {
                    warn!(url = %page.url, section = %chunk.label, error = %e,
                          "upsert failed, skipping chunk");
                }
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DIMS: usize = 4;

    fn zero_delay_limits() -> IngestLimits {
        IngestLimits {
            max_urls: 2,
            url_delay: Duration::ZERO,
            embed_delay: Duration::ZERO,
            max_chunk_chars: 3000,
        }
    }

    async fn test_store() -> PassageStore {
        let tmp = std::env::temp_dir().join(format!("hrlex_rt_test_{}.db", Uuid::now_v7()));
        PassageStore::open(&tmp, DIMS).await.expect("open test db")
    }

    fn ingestor_for(server: &MockServer) -> RealtimeIngestor {
        let discovery =
            DiscoveryClient::with_base_url(Url::parse(&server.uri()).unwrap()).unwrap();
        let extractor = Extractor::new(100).unwrap();
        let embeddings =
            EmbeddingClient::new(&server.uri(), "test-key", "test-model", DIMS).unwrap();
        RealtimeIngestor::new(
            discovery,
            extractor,
            embeddings,
            Jurisdiction::default(),
            zero_delay_limits(),
        )
    }

    fn article_html(paragraph_count: usize) -> String {
        let paragraph = "Employees who work a 5-day week must receive at least 28 days paid \
                         annual leave a year, which is the statutory minimum entitlement.";
        let body: String = (0..paragraph_count)
            .map(|_| format!("<p>{paragraph}</p>"))
            .collect();
        format!(
            "<html><head><title>Holiday entitlement</title></head>\
             <body><main>{body}</main></body></html>"
        )
    }

    async fn mount_search(server: &MockServer, urls: &[&str]) {
        let results: Vec<serde_json::Value> = urls
            .iter()
            .map(|path| {
                serde_json::json!({
                    "web_url": format!("{}{path}", server.uri()),
                    "title": "Discovered page",
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/api/search.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": results})),
            )
            .mount(server)
            .await;
    }

    async fn mount_embeddings(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0, 0.0, 0.0, 0.0]}],
                "usage": {"prompt_tokens": 5, "total_tokens": 5},
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn ingests_discovered_page() {
        let server = MockServer::start().await;
        mount_search(&server, &["/holiday-entitlement-rights"]).await;
        mount_embeddings(&server).await;

        Mock::given(method("GET"))
            .and(path("/holiday-entitlement-rights"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_html(2)))
            .mount(&server)
            .await;

        let store = test_store().await;
        let ingestor = ingestor_for(&server);

        let records = ingestor
            .ingest_for_query(&store, "holiday entitlement rules", None)
            .await
            .unwrap();

        assert_eq!(records.len(), 1, "two short paragraphs fit one chunk");
        assert_eq!(records[0].section, "Part 1");
        assert_eq!(records[0].topic, Some(Topic::Holiday));
        assert_eq!(records[0].jurisdiction.as_str(), "UK");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn skips_urls_already_stored() {
        let server = MockServer::start().await;
        let url_path = "/holiday-entitlement-rights";
        mount_search(&server, &[url_path]).await;
        mount_embeddings(&server).await;

        // No page mock mounted: a fetch attempt would fail the ingest.
        let store = test_store().await;
        store
            .upsert(&NewPassage {
                title: "Existing".into(),
                url: format!("{}{url_path}", server.uri()),
                jurisdiction: Jurisdiction::default(),
                topic: Some(Topic::Holiday),
                section: "Part 1".into(),
                content: "Already ingested content.".into(),
                last_refreshed_at: Utc::now(),
                embedding: vec![1.0, 0.0, 0.0, 0.0],
            })
            .await
            .unwrap();

        let ingestor = ingestor_for(&server);
        let records = ingestor
            .ingest_for_query(&store, "holiday entitlement", None)
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn caps_fetches_per_invocation() {
        let server = MockServer::start().await;
        mount_search(&server, &["/page-one", "/page-two", "/page-three"]).await;
        mount_embeddings(&server).await;

        for url_path in ["/page-one", "/page-two", "/page-three"] {
            Mock::given(method("GET"))
                .and(path(url_path))
                .respond_with(ResponseTemplate::new(200).set_body_string(article_html(1)))
                .mount(&server)
                .await;
        }

        let store = test_store().await;
        let ingestor = ingestor_for(&server);
        let records = ingestor
            .ingest_for_query(&store, "holiday entitlement", None)
            .await
            .unwrap();

        // Only the first two discovered URLs are fetched.
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.url.ends_with("/page-three")));
    }

    #[tokio::test]
    async fn extraction_failure_skips_url_not_batch() {
        let server = MockServer::start().await;
        mount_search(&server, &["/broken", "/working"]).await;
        mount_embeddings(&server).await;

        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/working"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_html(1)))
            .mount(&server)
            .await;

        let store = test_store().await;
        let ingestor = ingestor_for(&server);
        let records = ingestor
            .ingest_for_query(&store, "holiday entitlement", None)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].url.ends_with("/working"));
    }

    #[tokio::test]
    async fn embedding_failure_skips_chunk_not_page() {
        let server = MockServer::start().await;
        mount_search(&server, &["/guidance"]).await;

        Mock::given(method("GET"))
            .and(path("/guidance"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_html(1)))
            .mount(&server)
            .await;

        // Embedding service down for every chunk.
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = test_store().await;
        let ingestor = ingestor_for(&server);
        let records = ingestor
            .ingest_for_query(&store, "holiday entitlement", None)
            .await
            .unwrap();

        // Every chunk failed, but the invocation itself succeeded.
        assert!(records.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn no_discovery_results_is_empty_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = test_store().await;
        let ingestor = ingestor_for(&server);
        // No Acas keyword either: both sources come back empty.
        let records = ingestor
            .ingest_for_query(&store, "obscure niche topic", None)
            .await
            .unwrap();

        assert!(records.is_empty());
    }
}
