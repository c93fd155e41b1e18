//! libSQL-backed passage store with similarity search.
//!
//! The [`PassageStore`] wraps a local libSQL database holding one row per
//! `(url, section)` passage. It is the single seam where untyped rows become
//! strongly-typed [`PassageRecord`]s: malformed rows fail fast here instead
//! of propagating.
//!
//! Similarity search filters rows by jurisdiction/topic in SQL and scores
//! cosine similarity in process. The corpus is small (hundreds of chunks per
//! jurisdiction), and in-process scoring keeps ordering deterministic:
//! ties break on ascending row id, so identical inputs always produce
//! identical output.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, instrument};
use uuid::Uuid;

use hrlex_shared::{
    CandidatePassage, HrlexError, Jurisdiction, PassageRecord, Result, RetrievalFilters, Topic,
};

// ---------------------------------------------------------------------------
// NewPassage
// ---------------------------------------------------------------------------

/// A passage to be written. The store assigns the row id on first insert;
/// re-ingesting the same `(url, section)` overwrites content, embedding,
/// and timestamp while keeping the original id.
#[derive(Debug, Clone)]
pub struct NewPassage {
    pub title: String,
    pub url: String,
    pub jurisdiction: Jurisdiction,
    pub topic: Option<Topic>,
    pub section: String,
    pub content: String,
    pub last_refreshed_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// PassageStore
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct PassageStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    dimensions: usize,
}

impl PassageStore {
    /// Open or create a database at `path`, running pending migrations.
    ///
    /// `dimensions` fixes the embedding dimensionality for the whole store;
    /// upserts and searches with a different dimension are rejected.
    pub async fn open(path: &Path, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(HrlexError::validation("embedding dimensions must be non-zero"));
        }

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HrlexError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HrlexError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| HrlexError::Storage(e.to_string()))?;

        let store = Self {
            db,
            conn,
            dimensions,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    HrlexError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(HrlexError::validation(format!(
                "embedding has {} dimensions, store expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Upsert
    // -----------------------------------------------------------------------

    /// Write or overwrite the row keyed by `(url, section)`.
    ///
    /// Idempotent: calling twice with identical input leaves exactly one row
    /// and no extra cost beyond what the caller already spent embedding.
    /// Concurrent upserts racing on the same key resolve last-writer-wins.
    #[instrument(skip_all, fields(url = %passage.url, section = %passage.section))]
    pub async fn upsert(&self, passage: &NewPassage) -> Result<PassageRecord> {
        self.check_dimensions(&passage.embedding)?;

        let id = Uuid::now_v7().to_string();
        let blob = encode_embedding(&passage.embedding);

        self.conn
            .execute(
                "INSERT INTO passages
                   (id, title, url, jurisdiction, topic, section, content, last_refreshed_at, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(url, section) DO UPDATE SET
                   title = excluded.title,
                   jurisdiction = excluded.jurisdiction,
                   topic = excluded.topic,
                   content = excluded.content,
                   last_refreshed_at = excluded.last_refreshed_at,
                   embedding = excluded.embedding",
                params![
                    id.as_str(),
                    passage.title.as_str(),
                    passage.url.as_str(),
                    passage.jurisdiction.as_str(),
                    passage.topic.map(|t| t.label()),
                    passage.section.as_str(),
                    passage.content.as_str(),
                    passage.last_refreshed_at.to_rfc3339(),
                    blob,
                ],
            )
            .await
            .map_err(|e| HrlexError::Storage(e.to_string()))?;

        // Read the row back so callers see the canonical id (the original
        // one when the upsert hit an existing row).
        self.get_by_key(&passage.url, &passage.section)
            .await?
            .ok_or_else(|| HrlexError::Storage("upserted row not found on read-back".into()))
    }

    /// Get a passage by its `(url, section)` identity key.
    pub async fn get_by_key(&self, url: &str, section: &str) -> Result<Option<PassageRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, url, jurisdiction, topic, section, content, last_refreshed_at, embedding
                 FROM passages WHERE url = ?1 AND section = ?2",
                params![url, section],
            )
            .await
            .map_err(|e| HrlexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(HrlexError::Storage(e.to_string())),
        }
    }

    /// Whether any passage exists for `url`, regardless of section.
    ///
    /// The real-time fallback checks this before fetching so it never pays
    /// fetch/embedding cost for a page that is already stored, and never
    /// clobbers fresher rows with stale chunk boundaries.
    pub async fn exists_for_url(&self, url: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM passages WHERE url = ?1 LIMIT 1",
                params![url],
            )
            .await
            .map_err(|e| HrlexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(HrlexError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Similarity search over passages matching `filters`.
    ///
    /// Returns up to `limit` candidates ordered by cosine similarity,
    /// highest first; ties break on ascending id so results are reproducible
    /// for identical inputs. Failures surface as
    /// [`HrlexError::SearchUnavailable`]; the retrieval layer degrades them
    /// to an empty candidate set.
    #[instrument(skip_all, fields(jurisdiction = %filters.jurisdiction, topic = ?filters.topic, limit))]
    pub async fn search(
        &self,
        query_embedding: &[f32],
        filters: &RetrievalFilters,
        limit: usize,
    ) -> Result<Vec<CandidatePassage>> {
        self.check_dimensions(query_embedding)?;

        let sql = "SELECT id, title, url, jurisdiction, topic, section, content, last_refreshed_at, embedding
                   FROM passages WHERE jurisdiction = ?1 AND (?2 IS NULL OR topic = ?2)";

        let mut rows = self
            .conn
            .query(
                sql,
                params![
                    filters.jurisdiction.as_str(),
                    filters.topic.map(|t| t.label()),
                ],
            )
            .await
            .map_err(|e| HrlexError::SearchUnavailable(e.to_string()))?;

        let mut candidates: Vec<CandidatePassage> = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let record = row_to_record(&row)?;
                    let similarity = cosine_similarity(query_embedding, &record.embedding);
                    candidates.push(CandidatePassage { record, similarity });
                }
                Ok(None) => break,
                Err(e) => return Err(HrlexError::SearchUnavailable(e.to_string())),
            }
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        candidates.truncate(limit);

        debug!(results = candidates.len(), "similarity search complete");
        Ok(candidates)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Total number of stored passages.
    pub async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM passages", params![])
            .await
            .map_err(|e| HrlexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(|e| HrlexError::Storage(e.to_string()))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(HrlexError::Storage(e.to_string())),
        }
    }

    /// Delete passages whose `last_refreshed_at` is older than
    /// `max_age_days`. Returns the number of rows purged.
    #[instrument(skip(self))]
    pub async fn purge_stale(&self, max_age_days: i64) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(max_age_days)).to_rfc3339();
        let purged = self
            .conn
            .execute(
                "DELETE FROM passages WHERE last_refreshed_at < ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| HrlexError::Storage(e.to_string()))?;

        tracing::info!(purged, max_age_days, "purged stale passages");
        Ok(purged)
    }
}

// ---------------------------------------------------------------------------
// Embedding codec & scoring
// ---------------------------------------------------------------------------

/// Encode an embedding as a little-endian f32 blob.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 blob back into an embedding.
pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(HrlexError::Storage(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity of two equal-length vectors; 0.0 for zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Convert a database row to a [`PassageRecord`], failing fast on malformed
/// data (this is the one seam where untyped rows enter the domain).
fn row_to_record(row: &libsql::Row) -> Result<PassageRecord> {
    let jurisdiction: String = row
        .get(3)
        .map_err(|e| HrlexError::Storage(e.to_string()))?;
    let topic: Option<String> = row.get::<String>(4).ok();
    let refreshed: String = row
        .get(7)
        .map_err(|e| HrlexError::Storage(e.to_string()))?;
    let blob: Vec<u8> = row
        .get(8)
        .map_err(|e| HrlexError::Storage(e.to_string()))?;

    Ok(PassageRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| HrlexError::Storage(e.to_string()))?,
        title: row
            .get::<String>(1)
            .map_err(|e| HrlexError::Storage(e.to_string()))?,
        url: row
            .get::<String>(2)
            .map_err(|e| HrlexError::Storage(e.to_string()))?,
        jurisdiction: Jurisdiction::new(&jurisdiction)
            .map_err(|e| HrlexError::Storage(format!("bad jurisdiction column: {e}")))?,
        topic: topic
            .map(|t| {
                t.parse::<Topic>()
                    .map_err(|e| HrlexError::Storage(format!("bad topic column: {e}")))
            })
            .transpose()?,
        section: row
            .get::<String>(5)
            .map_err(|e| HrlexError::Storage(e.to_string()))?,
        content: row
            .get::<String>(6)
            .map_err(|e| HrlexError::Storage(e.to_string()))?,
        last_refreshed_at: DateTime::parse_from_rfc3339(&refreshed)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| HrlexError::Storage(format!("invalid date: {e}")))?,
        embedding: decode_embedding(&blob)?,
    })
}
