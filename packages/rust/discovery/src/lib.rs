//! External document discovery for the real-time ingestion fallback.
//!
//! Candidate URLs come from two independent sources awaited together:
//! the GOV.UK search API, and a static keyword table for Acas, which has no
//! public search API. Either source failing degrades to an empty result for
//! that source without aborting the other; discovery as a whole never fails
//! a retrieval request.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use hrlex_shared::{HrlexError, Result};

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("hrlex/", env!("CARGO_PKG_VERSION"));

/// Default timeout for discovery requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// How many results to request from the search API.
const SEARCH_RESULT_COUNT: u32 = 5;

/// Default GOV.UK origin.
const GOV_UK_BASE: &str = "https://www.gov.uk";

// ---------------------------------------------------------------------------
// DiscoveredPage
// ---------------------------------------------------------------------------

/// One candidate page surfaced by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPage {
    pub url: String,
    pub title: String,
}

// ---------------------------------------------------------------------------
// DiscoveryClient
// ---------------------------------------------------------------------------

/// Client for the authoritative-site search API plus the static Acas table.
pub struct DiscoveryClient {
    client: Client,
    search_base: Url,
}

impl DiscoveryClient {
    /// Create a client against the production GOV.UK origin.
    pub fn new() -> Result<Self> {
        let base = Url::parse(GOV_UK_BASE).expect("valid constant URL");
        Self::with_base_url(base)
    }

    /// Create a client against a specific origin (injectable for tests).
    pub fn with_base_url(search_base: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| HrlexError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            search_base,
        })
    }

    /// Discover candidate pages from both sources concurrently.
    ///
    /// Per-source failures are logged and degrade to an empty list for that
    /// source; the combined list keeps search results ahead of table hits.
    #[instrument(skip(self))]
    pub async fn discover(&self, query: &str) -> Vec<DiscoveredPage> {
        let (search_result, acas_result) =
            tokio::join!(self.search_gov_uk(query), self.search_acas(query));

        let mut pages = match search_result {
            Ok(pages) => pages,
            Err(e) => {
                warn!(error = %e, "GOV.UK search failed, degrading to empty");
                Vec::new()
            }
        };

        match acas_result {
            Ok(acas_pages) => pages.extend(acas_pages),
            Err(e) => {
                warn!(error = %e, "Acas lookup failed, degrading to empty");
            }
        }

        debug!(candidates = pages.len(), "discovery complete");
        pages
    }

    /// Query the GOV.UK search API for pages matching `query`.
    pub async fn search_gov_uk(&self, query: &str) -> Result<Vec<DiscoveredPage>> {
        let mut url = self
            .search_base
            .join("/api/search.json")
            .map_err(|e| HrlexError::Network(format!("bad search URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", &SEARCH_RESULT_COUNT.to_string())
            .append_pair("fields", "web_url,title");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HrlexError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HrlexError::Network(format!("search failed: HTTP {status}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| HrlexError::Network(format!("invalid search response: {e}")))?;

        let expected_host = self.search_base.host_str().unwrap_or_default().to_string();

        Ok(body
            .results
            .into_iter()
            .filter_map(|row| {
                let url = row.web_url?;
                let title = row.title.unwrap_or_default();
                if url.is_empty() || url.contains("/api/") || url.contains('#') {
                    return None;
                }
                // Keep only results on the search origin's host.
                let parsed = Url::parse(&url).ok()?;
                if parsed.host_str() != Some(expected_host.as_str()) {
                    return None;
                }
                Some(DiscoveredPage { url, title })
            })
            .collect())
    }

    /// Look up Acas pages for `query`.
    ///
    /// Acas has no public search API, so this consults a small keyword table
    /// of its most-referenced guidance pages. Async to sit symmetrically
    /// beside the search call in `discover`.
    async fn search_acas(&self, query: &str) -> Result<Vec<DiscoveredPage>> {
        Ok(acas_lookup(query))
    }
}

// ---------------------------------------------------------------------------
// Acas keyword table
// ---------------------------------------------------------------------------

/// Ordered keyword → page table; first matching keyword wins.
const ACAS_PAGES: [(&str, &str, &str); 5] = [
    (
        "pension",
        "https://www.acas.org.uk/pensions",
        "Pensions - Acas",
    ),
    (
        "working time",
        "https://www.acas.org.uk/working-time-rules",
        "Working time rules - Acas",
    ),
    (
        "minimum wage",
        "https://www.acas.org.uk/national-minimum-wage",
        "National minimum wage - Acas",
    ),
    (
        "discrimination",
        "https://www.acas.org.uk/discrimination-and-the-law",
        "Discrimination and the law - Acas",
    ),
    (
        "equality",
        "https://www.acas.org.uk/equality-and-discrimination",
        "Equality and discrimination - Acas",
    ),
];

/// Static keyword lookup for Acas guidance pages.
pub fn acas_lookup(query: &str) -> Vec<DiscoveredPage> {
    let lower = query.to_lowercase();
    for (keyword, url, title) in ACAS_PAGES {
        if lower.contains(keyword) {
            return vec![DiscoveredPage {
                url: url.into(),
                title: title.into(),
            }];
        }
    }
    Vec::new()
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
}

#[derive(Deserialize)]
struct SearchRow {
    web_url: Option<String>,
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> DiscoveryClient {
        DiscoveryClient::with_base_url(Url::parse(&server.uri()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn search_parses_and_filters_results() {
        let server = MockServer::start().await;
        let origin = server.uri();

        let body = serde_json::json!({
            "results": [
                {"web_url": format!("{origin}/holiday-entitlement-rights"), "title": "Holiday entitlement"},
                {"web_url": format!("{origin}/api/content/holidays"), "title": "API row"},
                {"web_url": format!("{origin}/guide#section"), "title": "Fragment row"},
                {"web_url": "https://other.example.com/page", "title": "Foreign host"},
                {"title": "Missing URL"},
            ]
        });

        Mock::given(method("GET"))
            .and(path("/api/search.json"))
            .and(query_param("q", "holiday entitlement"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let pages = client.search_gov_uk("holiday entitlement").await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Holiday entitlement");
        assert!(pages[0].url.ends_with("/holiday-entitlement-rights"));
    }

    #[tokio::test]
    async fn search_failure_is_a_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/search.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.search_gov_uk("anything").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn discover_degrades_failed_source_to_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/search.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        // Search fails, but the Acas table still matches "pension".
        let pages = client.discover("workplace pension contributions").await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://www.acas.org.uk/pensions");
    }

    #[tokio::test]
    async fn discover_orders_search_before_table_hits() {
        let server = MockServer::start().await;
        let origin = server.uri();

        let body = serde_json::json!({
            "results": [
                {"web_url": format!("{origin}/workplace-pensions"), "title": "Workplace pensions"},
            ]
        });

        Mock::given(method("GET"))
            .and(path("/api/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let pages = client.discover("pension auto-enrolment").await;

        assert_eq!(pages.len(), 2);
        assert!(pages[0].url.ends_with("/workplace-pensions"));
        assert_eq!(pages[1].url, "https://www.acas.org.uk/pensions");
    }

    #[test]
    fn acas_lookup_first_match_wins() {
        let pages = acas_lookup("pension and equality rules");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://www.acas.org.uk/pensions");
    }

    #[test]
    fn acas_lookup_is_case_insensitive() {
        let pages = acas_lookup("Working Time limits");
        assert_eq!(pages.len(), 1);
        assert!(pages[0].url.ends_with("working-time-rules"));
    }

    #[test]
    fn acas_lookup_no_match_is_empty() {
        assert!(acas_lookup("astrophysics").is_empty());
    }
}
