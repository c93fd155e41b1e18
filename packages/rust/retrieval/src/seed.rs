//! Batch seeding and staleness refresh for the passage store.
//!
//! Seeding walks a curated registry of authoritative pages, extracting,
//! chunking (heading-based, since these pages carry real structure),
//! embedding, and upserting each one. Extraction and embedding failures are
//! both item-scoped: a failed page or chunk is logged and skipped, and the
//! batch always runs to completion.
//!
//! Refresh is the maintenance pass: purge rows older than the staleness
//! window, then re-seed so the curated base never serves expired guidance.

use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use url::Url;

use hrlex_chunk::{ChunkOptions, chunk_document};
use hrlex_embeddings::EmbeddingClient;
use hrlex_extract::Extractor;
use hrlex_shared::{IngestConfig, Jurisdiction, Result, SeedUrl, Topic};
use hrlex_storage::{NewPassage, PassageStore};

// ---------------------------------------------------------------------------
// Options, progress, reports
// ---------------------------------------------------------------------------

/// Pacing and bounds for one seeding run.
#[derive(Debug, Clone)]
pub struct SeedOptions {
    /// Delay between per-chunk embedding calls.
    pub chunk_delay: Duration,
    /// Chunk size bound in characters.
    pub max_chunk_chars: usize,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for SeedOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            chunk_delay: Duration::from_millis(config.seed_delay_ms),
            max_chunk_chars: config.max_chunk_chars,
        }
    }
}

/// Progress callback for reporting seeding status.
pub trait SeedProgress: Send + Sync {
    /// Called when a seed URL starts processing.
    fn url_started(&self, url: &str, current: usize, total: usize);
    /// Called when a chunk has been stored.
    fn chunk_stored(&self, section: &str);
    /// Called when a URL is skipped after a failure.
    fn url_failed(&self, url: &str, error: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentSeedProgress;

impl SeedProgress for SilentSeedProgress {
    fn url_started(&self, _url: &str, _current: usize, _total: usize) {}
    fn chunk_stored(&self, _section: &str) {}
    fn url_failed(&self, _url: &str, _error: &str) {}
}

/// Summary of a completed seeding run.
#[derive(Debug, Default, Clone)]
pub struct SeedReport {
    /// URLs fully processed (even if some chunks were skipped).
    pub urls_processed: usize,
    /// URLs skipped after fetch/extraction failure.
    pub urls_failed: usize,
    /// Chunks embedded and stored.
    pub chunks_stored: usize,
    /// Chunks skipped after embedding/storage failure.
    pub chunks_failed: usize,
}

/// Summary of a refresh pass.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Rows present before the purge.
    pub rows_before: u64,
    /// Rows deleted by the staleness purge.
    pub rows_purged: u64,
    /// Rows present after re-seeding.
    pub rows_after: u64,
    /// The seeding run's own report.
    pub seed: SeedReport,
}

// ---------------------------------------------------------------------------
// Seed registry
// ---------------------------------------------------------------------------

/// Built-in registry of authoritative employment-guidance pages, used when
/// the config supplies no `[[seeds]]` overrides.
pub fn default_seed_urls() -> Vec<SeedUrl> {
    fn seed(url: &str, topic: Topic, title: &str) -> SeedUrl {
        SeedUrl {
            url: url.into(),
            topic,
            title: Some(title.into()),
        }
    }

    vec![
        // TUPE
        seed(
            "https://www.gov.uk/transfers-takeovers",
            Topic::Tupe,
            "TUPE transfers and takeovers",
        ),
        seed("https://www.acas.org.uk/tupe", Topic::Tupe, "TUPE - Acas guidance"),
        // Statutory sick pay
        seed(
            "https://www.gov.uk/statutory-sick-pay",
            Topic::Sick,
            "Statutory Sick Pay (SSP)",
        ),
        seed(
            "https://www.acas.org.uk/absence-from-work/time-off-sick",
            Topic::Sick,
            "Time off sick - Acas",
        ),
        // Maternity/paternity
        seed(
            "https://www.gov.uk/maternity-pay-leave",
            Topic::MaternityPaternity,
            "Maternity pay and leave",
        ),
        seed(
            "https://www.gov.uk/paternity-pay-leave",
            Topic::MaternityPaternity,
            "Paternity pay and leave",
        ),
        seed(
            "https://www.acas.org.uk/maternity-paternity-and-adoption-leave",
            Topic::MaternityPaternity,
            "Maternity, paternity and adoption - Acas",
        ),
        // Holiday entitlement
        seed(
            "https://www.gov.uk/holiday-entitlement-rights",
            Topic::Holiday,
            "Holiday entitlement",
        ),
        seed(
            "https://www.acas.org.uk/checking-holiday-entitlement",
            Topic::Holiday,
            "Checking holiday entitlement - Acas",
        ),
        // Employment contracts
        seed(
            "https://www.gov.uk/employment-contracts-and-conditions",
            Topic::Employment,
            "Employment contracts",
        ),
        // Right to work / visas
        seed(
            "https://www.gov.uk/legal-right-work-uk",
            Topic::Visas,
            "Right to work in the UK",
        ),
        seed(
            "https://www.gov.uk/check-job-applicant-right-to-work",
            Topic::Visas,
            "Check right to work",
        ),
        // Redundancy
        seed(
            "https://www.gov.uk/redundancy-your-rights",
            Topic::Redundancy,
            "Redundancy rights",
        ),
        // Disciplinaries
        seed(
            "https://www.acas.org.uk/disciplinary-procedure-step-by-step",
            Topic::Disciplinary,
            "Disciplinary procedures - Acas",
        ),
    ]
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Ingest every seed URL into the store.
#[instrument(skip_all, fields(seeds = seeds.len(), jurisdiction = %jurisdiction))]
pub async fn seed_passages(
    store: &PassageStore,
    embeddings: &EmbeddingClient,
    extractor: &Extractor,
    jurisdiction: &Jurisdiction,
    seeds: &[SeedUrl],
    options: &SeedOptions,
    progress: &dyn SeedProgress,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let total = seeds.len();

    for (i, seed) in seeds.iter().enumerate() {
        progress.url_started(&seed.url, i + 1, total);

        match ingest_seed(store, embeddings, extractor, jurisdiction, seed, options, progress)
            .await
        {
            Ok((stored, failed)) => {
                report.urls_processed += 1;
                report.chunks_stored += stored;
                report.chunks_failed += failed;
            }
            Err(e) => {
                warn!(url = %seed.url, error = %e, "seed URL failed, skipping");
                progress.url_failed(&seed.url, &e.to_string());
                report.urls_failed += 1;
            }
        }
    }

    info!(
        urls_processed = report.urls_processed,
        urls_failed = report.urls_failed,
        chunks_stored = report.chunks_stored,
        chunks_failed = report.chunks_failed,
        "seeding complete"
    );
    Ok(report)
}

/// Ingest one seed URL. Returns `(chunks_stored, chunks_failed)`.
async fn ingest_seed(
    store: &PassageStore,
    embeddings: &EmbeddingClient,
    extractor: &Extractor,
    jurisdiction: &Jurisdiction,
    seed: &SeedUrl,
    options: &SeedOptions,
    progress: &dyn SeedProgress,
) -> Result<(usize, usize)> {
    let url = Url::parse(&seed.url)
        .map_err(|e| hrlex_shared::HrlexError::Extraction(format!("{}: {e}", seed.url)))?;

    let article = extractor.fetch_and_extract(&url).await?;

    let opts = ChunkOptions {
        max_chars: options.max_chunk_chars,
    };
    let chunks = chunk_document(&article.content_html, &article.main_text, &opts);

    let title = seed.title.clone().unwrap_or_else(|| article.title.clone());

    let mut stored = 0usize;
    let mut failed = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && !options.chunk_delay.is_zero() {
            sleep(options.chunk_delay).await;
        }

        // A failed chunk embedding skips that chunk only; the rest of the
        // page (and batch) continues.
        let embedded = match embeddings.embed(&chunk.text).await {
            Ok(embedded) => embedded,
            Err(e) => {
                warn!(url = %seed.url, section = %chunk.label, error = %e,
                      "embedding failed, skipping chunk");
                failed += 1;
                continue;
            }
        };

        let passage = NewPassage {
            title: title.clone(),
            url: seed.url.clone(),
            jurisdiction: jurisdiction.clone(),
            topic: Some(seed.topic),
            section: chunk.label.clone(),
            content: chunk.text.clone(),
            last_refreshed_at: Utc::now(),
            embedding: embedded.embedding,
        };

        match store.upsert(&passage).await {
            Ok(record) => {
                progress.chunk_stored(&record.section);
                stored += 1;
            }
            Err(e) => {
                warn!(url = %seed.url, section = %chunk.label, error = %e,
                      "upsert failed, skipping chunk");
                failed += 1;
            }
        }
    }

    Ok((stored, failed))
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// Purge rows past the staleness window, then re-seed.
#[instrument(skip_all, fields(staleness_days))]
pub async fn refresh_passages(
    store: &PassageStore,
    embeddings: &EmbeddingClient,
    extractor: &Extractor,
    jurisdiction: &Jurisdiction,
    seeds: &[SeedUrl],
    options: &SeedOptions,
    staleness_days: i64,
    progress: &dyn SeedProgress,
) -> Result<RefreshReport> {
    let rows_before = store.count().await?;
    let rows_purged = store.purge_stale(staleness_days).await?;

    let seed =
        seed_passages(store, embeddings, extractor, jurisdiction, seeds, options, progress)
            .await?;

    let rows_after = store.count().await?;

    info!(rows_before, rows_purged, rows_after, "refresh complete");
    Ok(RefreshReport {
        rows_before,
        rows_purged,
        rows_after,
        seed,
    })
}
