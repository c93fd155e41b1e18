//! Core domain types for the hrlex retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HrlexError, Result};

/// Default number of embedding dimensions for the passage store.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Fixed topic taxonomy for employment-guidance passages.
///
/// Serialized as the human-readable labels used in the store
/// ("TUPE", "Maternity/Paternity", ...). [`Topic::General`] is the
/// catch-all assigned when no keyword matches a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Tupe,
    Sick,
    MaternityPaternity,
    Holiday,
    Pensions,
    Visas,
    Employment,
    Redundancy,
    Disciplinary,
    WorkingTime,
    Equality,
    HealthSafety,
    General,
}

impl Topic {
    /// All topics, in declaration order.
    pub const ALL: [Topic; 13] = [
        Topic::Tupe,
        Topic::Sick,
        Topic::MaternityPaternity,
        Topic::Holiday,
        Topic::Pensions,
        Topic::Visas,
        Topic::Employment,
        Topic::Redundancy,
        Topic::Disciplinary,
        Topic::WorkingTime,
        Topic::Equality,
        Topic::HealthSafety,
        Topic::General,
    ];

    /// The label stored in the database and shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            Topic::Tupe => "TUPE",
            Topic::Sick => "Sick",
            Topic::MaternityPaternity => "Maternity/Paternity",
            Topic::Holiday => "Holiday",
            Topic::Pensions => "Pensions",
            Topic::Visas => "Visas",
            Topic::Employment => "Employment",
            Topic::Redundancy => "Redundancy",
            Topic::Disciplinary => "Disciplinary",
            Topic::WorkingTime => "Working Time",
            Topic::Equality => "Equality",
            Topic::HealthSafety => "Health Safety",
            Topic::General => "General",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Topic {
    type Err = HrlexError;

    fn from_str(s: &str) -> Result<Self> {
        Topic::ALL
            .iter()
            .find(|t| t.label().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| HrlexError::validation(format!("unknown topic: {s}")))
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Jurisdiction
// ---------------------------------------------------------------------------

/// An uppercase country code scoping passages to one legal regime (e.g. "UK").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jurisdiction(String);

impl Jurisdiction {
    /// Create a jurisdiction from a non-empty country code, normalizing case.
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let code = code.as_ref().trim();
        if code.is_empty() || code.len() > 8 {
            return Err(HrlexError::validation(format!(
                "invalid jurisdiction code: {code:?}"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Jurisdiction {
    fn default() -> Self {
        Self("UK".into())
    }
}

impl std::fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// PassageRecord
// ---------------------------------------------------------------------------

/// A stored, retrievable unit of source content with its embedding.
///
/// The pair `(url, section)` is the unique identity key: re-ingesting the
/// same URL and section overwrites the row rather than duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageRecord {
    /// Store-assigned identifier (UUID v7, time-sortable).
    pub id: String,
    /// Source page title.
    pub title: String,
    /// Source page URL.
    pub url: String,
    /// Legal jurisdiction the passage applies to.
    pub jurisdiction: Jurisdiction,
    /// Topic from the fixed taxonomy, when known.
    pub topic: Option<Topic>,
    /// Human-readable section label (a heading or "Part N").
    pub section: String,
    /// Plain-text passage content, bounded by the chunker.
    pub content: String,
    /// When this row was last ingested or refreshed.
    pub last_refreshed_at: DateTime<Utc>,
    /// Fixed-dimension embedding vector.
    pub embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// CandidatePassage
// ---------------------------------------------------------------------------

/// A [`PassageRecord`] paired with the similarity score from one search call.
///
/// Ephemeral: owned by the retrieval call that produced it, never persisted.
#[derive(Debug, Clone)]
pub struct CandidatePassage {
    pub record: PassageRecord,
    /// Cosine similarity against the query embedding, in 0..1.
    pub similarity: f32,
}

// ---------------------------------------------------------------------------
// ChunkUnit
// ---------------------------------------------------------------------------

/// A labeled segment of extracted text, consumed by embed + store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUnit {
    /// Section label (heading text or a generated ordinal label).
    pub label: String,
    /// Bounded-size plain text.
    pub text: String,
}

// ---------------------------------------------------------------------------
// RetrievalFilters
// ---------------------------------------------------------------------------

/// Validated search filters passed to the passage store.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    pub jurisdiction: Jurisdiction,
    pub topic: Option<Topic>,
}

// ---------------------------------------------------------------------------
// Produced interface
// ---------------------------------------------------------------------------

/// One passage as handed to the answer-generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPassage {
    pub title: String,
    pub url: String,
    pub section: String,
    pub content: String,
}

impl From<&PassageRecord> for ContextPassage {
    fn from(record: &PassageRecord) -> Self {
        Self {
            title: record.title.clone(),
            url: record.url.clone(),
            section: record.section.clone(),
            content: record.content.clone(),
        }
    }
}

/// Final result of one retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    /// Up to six passages, ordered by relevance.
    pub passages: Vec<ContextPassage>,
    /// Whether the real-time fallback stored new content and a re-query ran.
    /// Informational only; never affects ranking.
    pub used_realtime_fallback: bool,
}

// ---------------------------------------------------------------------------
// SeedUrl
// ---------------------------------------------------------------------------

/// An entry in the batch-seeding registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUrl {
    /// Page to ingest.
    pub url: String,
    /// Topic assigned to every chunk of the page.
    pub topic: Topic,
    /// Title override; extracted from the page when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_label_roundtrip() {
        for topic in Topic::ALL {
            let parsed: Topic = topic.label().parse().expect("parse label");
            assert_eq!(parsed, topic);
        }
    }

    #[test]
    fn topic_parse_is_case_insensitive() {
        let parsed: Topic = "tupe".parse().unwrap();
        assert_eq!(parsed, Topic::Tupe);
        let parsed: Topic = "maternity/paternity".parse().unwrap();
        assert_eq!(parsed, Topic::MaternityPaternity);
    }

    #[test]
    fn topic_parse_rejects_unknown() {
        assert!("Astrophysics".parse::<Topic>().is_err());
    }

    #[test]
    fn topic_serde_uses_labels() {
        let json = serde_json::to_string(&Topic::WorkingTime).unwrap();
        assert_eq!(json, "\"Working Time\"");
        let parsed: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Topic::WorkingTime);
    }

    #[test]
    fn jurisdiction_normalizes_case() {
        let j = Jurisdiction::new("uk").unwrap();
        assert_eq!(j.as_str(), "UK");
    }

    #[test]
    fn jurisdiction_rejects_empty() {
        assert!(Jurisdiction::new("  ").is_err());
    }

    #[test]
    fn context_passage_from_record() {
        let record = PassageRecord {
            id: "0192b1c0-0000-7000-8000-000000000001".into(),
            title: "Holiday entitlement".into(),
            url: "https://www.gov.uk/holiday-entitlement-rights".into(),
            jurisdiction: Jurisdiction::default(),
            topic: Some(Topic::Holiday),
            section: "Statutory leave".into(),
            content: "Almost all workers are legally entitled to 5.6 weeks paid holiday.".into(),
            last_refreshed_at: Utc::now(),
            embedding: vec![0.0; 4],
        };

        let passage = ContextPassage::from(&record);
        assert_eq!(passage.title, record.title);
        assert_eq!(passage.section, "Statutory leave");
    }
}
