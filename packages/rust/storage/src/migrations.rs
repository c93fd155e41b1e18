//! SQL migration definitions for the hrlex passage database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
///
/// Embeddings are stored as little-endian f32 blobs; dimensionality is
/// enforced at the store boundary, not in the schema, since it is chosen
/// at open time.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: passages keyed by (url, section)",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Retrievable passages with embeddings
CREATE TABLE IF NOT EXISTS passages (
    id                TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    url               TEXT NOT NULL,
    jurisdiction      TEXT NOT NULL,
    topic             TEXT,
    section           TEXT NOT NULL,
    content           TEXT NOT NULL,
    last_refreshed_at TEXT NOT NULL,
    embedding         BLOB NOT NULL,
    UNIQUE(url, section)
);

CREATE INDEX IF NOT EXISTS idx_passages_jurisdiction ON passages(jurisdiction);
CREATE INDEX IF NOT EXISTS idx_passages_topic ON passages(topic);
CREATE INDEX IF NOT EXISTS idx_passages_url ON passages(url);
CREATE INDEX IF NOT EXISTS idx_passages_refreshed ON passages(last_refreshed_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
