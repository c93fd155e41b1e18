//! Page fetching and readability-style article extraction.
//!
//! Given a URL, the [`Extractor`] fetches raw markup and derives the page
//! title, clean article text, and the article's structural markup. The
//! heuristic keeps the primary content container and drops navigation and
//! other chrome. Pages whose derived text is shorter than the configured
//! minimum are treated as extraction failures, not as valid tiny content:
//! near-empty pages produce useless embeddings.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use hrlex_shared::{HrlexError, Result};

/// User-Agent string for page fetches (descriptive client identifier).
const USER_AGENT: &str = concat!(
    "hrlex/",
    env!("CARGO_PKG_VERSION"),
    " (compatible; employment-guidance-bot)"
);

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Timeout for page fetches.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Default minimum derived-text length for a successful extraction.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// ExtractedArticle
// ---------------------------------------------------------------------------

/// Result of extracting one page.
#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    /// Page title from `<title>` or the first heading.
    pub title: String,
    /// Clean article text, block-level elements joined by blank lines.
    pub main_text: String,
    /// Inner HTML of the chosen content container, for heading-based chunking.
    pub content_html: String,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// HTTP fetcher + readability-style content extractor.
pub struct Extractor {
    client: Client,
    min_content_chars: usize,
}

impl Extractor {
    /// Create an extractor with the given minimum content length.
    pub fn new(min_content_chars: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| HrlexError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            min_content_chars,
        })
    }

    /// Fetch `url` and extract its article content.
    ///
    /// Non-2xx responses, body read failures, and too-short derivations all
    /// surface as [`HrlexError::Extraction`]; the caller skips the URL.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_and_extract(&self, url: &Url) -> Result<ExtractedArticle> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| HrlexError::Extraction(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HrlexError::Extraction(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| HrlexError::Extraction(format!("{url}: body read failed: {e}")))?;

        let article = extract_article(&body, self.min_content_chars)?;
        debug!(
            title = %article.title,
            text_len = article.main_text.len(),
            "extraction complete"
        );
        Ok(article)
    }
}

// ---------------------------------------------------------------------------
// Extraction heuristic
// ---------------------------------------------------------------------------

/// Content containers tried in priority order; `body` is the last resort.
const CONTAINER_SELECTORS: [&str; 6] = [
    "article",
    "[role=\"main\"]",
    "main",
    ".content",
    "#content",
    "body",
];

/// Elements whose subtrees are never article content.
const BOILERPLATE_TAGS: [&str; 7] = ["nav", "header", "footer", "aside", "form", "script", "style"];

/// Block-level elements whose text makes up the article body.
const BLOCK_TAGS: [&str; 7] = ["p", "h1", "h2", "h3", "h4", "li", "blockquote"];

/// Derive `{title, main_text, content_html}` from raw markup.
///
/// Fails with [`HrlexError::Extraction`] when the derived text is shorter
/// than `min_content_chars`.
pub fn extract_article(html: &str, min_content_chars: usize) -> Result<ExtractedArticle> {
    let doc = Html::parse_document(html);

    let container = select_container(&doc)
        .ok_or_else(|| HrlexError::extraction("no content container found"))?;

    let main_text = block_text(&container);
    if main_text.chars().count() < min_content_chars {
        return Err(HrlexError::Extraction(format!(
            "derived text too short ({} chars, minimum {min_content_chars})",
            main_text.chars().count()
        )));
    }

    let title = extract_title(&doc).unwrap_or_else(|| "Untitled".to_string());

    Ok(ExtractedArticle {
        title,
        main_text,
        content_html: container.inner_html(),
    })
}

/// Pick the first matching content container.
fn select_container(doc: &Html) -> Option<ElementRef<'_>> {
    for sel_str in &CONTAINER_SELECTORS {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return Some(el);
            }
        }
    }
    None
}

/// Extract the page title from `<title>` or the first `<h1>`.
fn extract_title(doc: &Html) -> Option<String> {
    let title_sel = Selector::parse("title").expect("valid selector");
    if let Some(el) = doc.select(&title_sel).next() {
        let text = el.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }

    let h1_sel = Selector::parse("h1").expect("valid selector");
    doc.select(&h1_sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

/// Collect block-level text from a container, joined by blank lines.
///
/// Blocks inside boilerplate subtrees are skipped, as are blocks nested in
/// another collected block (an `li` containing a `p` contributes once).
fn block_text(container: &ElementRef<'_>) -> String {
    let block_sel = Selector::parse("p, h1, h2, h3, h4, li, blockquote").expect("valid selector");

    let mut blocks: Vec<String> = Vec::new();
    for el in container.select(&block_sel) {
        if has_ancestor_in(&el, container, &BOILERPLATE_TAGS)
            || has_ancestor_in(&el, container, &BLOCK_TAGS)
        {
            continue;
        }

        let text = normalize_whitespace(&el.text().collect::<String>());
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    blocks.join("\n\n")
}

/// Whether `el` has an ancestor (below `container`) whose tag is in `tags`.
fn has_ancestor_in(el: &ElementRef<'_>, container: &ElementRef<'_>, tags: &[&str]) -> bool {
    for ancestor in el.ancestors() {
        if ancestor.id() == container.id() {
            break;
        }
        if let Some(ancestor_el) = ElementRef::wrap(ancestor) {
            if tags.contains(&ancestor_el.value().name()) {
                return true;
            }
        }
    }
    false
}

/// Collapse internal whitespace runs and trim.
fn normalize_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILLER: &str = "This sentence pads the article body far enough past the minimum \
                          extraction length used by the production configuration.";

    fn page(body: &str) -> String {
        format!("<html><head><title>Test Page</title></head><body>{body}</body></html>")
    }

    #[test]
    fn extracts_title_and_text() {
        let html = page(&format!(
            "<main><h1>Holiday entitlement</h1><p>{FILLER}</p></main>"
        ));
        let article = extract_article(&html, 100).unwrap();

        assert_eq!(article.title, "Test Page");
        assert!(article.main_text.starts_with("Holiday entitlement"));
        assert!(article.main_text.contains(FILLER));
        assert!(article.content_html.contains("<h1>"));
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = format!(
            "<html><body><main><h1>Statutory Sick Pay</h1><p>{FILLER}</p></main></body></html>"
        );
        let article = extract_article(&html, 100).unwrap();
        assert_eq!(article.title, "Statutory Sick Pay");
    }

    #[test]
    fn strips_navigation_and_footer() {
        let html = page(&format!(
            r#"<nav><a href="/">Home</a><p>Menu item</p></nav>
               <main><p>{FILLER}</p></main>
               <footer><p>Copyright 2024</p></footer>"#
        ));
        let article = extract_article(&html, 100).unwrap();

        assert!(article.main_text.contains(FILLER));
        assert!(!article.main_text.contains("Menu item"));
        assert!(!article.main_text.contains("Copyright 2024"));
    }

    #[test]
    fn prefers_article_container_over_body() {
        let html = page(&format!(
            "<div><p>Sidebar text that should not be extracted.</p></div>\
             <article><p>{FILLER}</p></article>"
        ));
        let article = extract_article(&html, 100).unwrap();

        assert!(article.main_text.contains(FILLER));
        assert!(!article.main_text.contains("Sidebar"));
    }

    #[test]
    fn nested_blocks_contribute_once() {
        let html = page(&format!(
            "<main><ul><li>First point with <p>an embedded paragraph</p></li></ul>\
             <p>{FILLER}</p></main>"
        ));
        let article = extract_article(&html, 100).unwrap();

        let occurrences = article.main_text.matches("an embedded paragraph").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn short_content_is_an_extraction_failure() {
        let html = page("<main><p>Too short.</p></main>");
        let err = extract_article(&html, 100).unwrap_err();
        assert!(matches!(err, HrlexError::Extraction(_)), "got {err:?}");
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn whitespace_is_normalized() {
        let html = page(&format!(
            "<main><p>Spread   across\n\n   lines.</p><p>{FILLER}</p></main>"
        ));
        let article = extract_article(&html, 100).unwrap();
        assert!(article.main_text.contains("Spread across lines."));
    }

    #[tokio::test]
    async fn fetch_and_extract_happy_path() {
        let server = wiremock::MockServer::start().await;
        let html = page(&format!("<main><p>{FILLER}</p></main>"));

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/guidance"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let extractor = Extractor::new(100).unwrap();
        let url = Url::parse(&format!("{}/guidance", server.uri())).unwrap();
        let article = extractor.fetch_and_extract(&url).await.unwrap();

        assert_eq!(article.title, "Test Page");
        assert!(article.main_text.contains(FILLER));
    }

    #[tokio::test]
    async fn non_2xx_is_an_extraction_failure() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let extractor = Extractor::new(100).unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = extractor.fetch_and_extract(&url).await.unwrap_err();

        assert!(matches!(err, HrlexError::Extraction(_)), "got {err:?}");
        assert!(err.to_string().contains("404"));
    }
}
