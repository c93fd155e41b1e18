//! Keyword-based topic classification for free-text queries.
//!
//! Used only when the caller supplies no explicit topic. The mapping is an
//! ordered list tested top to bottom; the first matching keyword wins, and
//! queries matching nothing fall through to [`Topic::General`]. The function
//! is deterministic and total: every query maps to exactly one topic.

use hrlex_shared::Topic;

/// Ordered keyword → topic mappings. Order matters: earlier entries shadow
/// later ones for queries containing several keywords.
const KEYWORD_TOPICS: [(&[&str], Topic); 12] = [
    (&["pension"], Topic::Pensions),
    (&["maternity", "paternity"], Topic::MaternityPaternity),
    (&["holiday", "annual leave"], Topic::Holiday),
    (&["sick", "ssp"], Topic::Sick),
    (&["tupe"], Topic::Tupe),
    (&["visa", "right to work"], Topic::Visas),
    (&["redundancy"], Topic::Redundancy),
    (&["disciplinary", "dismissal"], Topic::Disciplinary),
    (&["working time", "minimum wage"], Topic::WorkingTime),
    (&["discrimination", "equality"], Topic::Equality),
    (&["health", "safety"], Topic::HealthSafety),
    (&["contract", "employment"], Topic::Employment),
];

/// Map a free-text query to a topic from the fixed taxonomy.
pub fn classify(query: &str) -> Topic {
    let lower = query.to_lowercase();
    for (keywords, topic) in KEYWORD_TOPICS {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return topic;
        }
    }
    Topic::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_keyword_group() {
        assert_eq!(classify("workplace pension auto-enrolment"), Topic::Pensions);
        assert_eq!(classify("shared maternity leave"), Topic::MaternityPaternity);
        assert_eq!(classify("how much annual leave do I get"), Topic::Holiday);
        assert_eq!(classify("when is SSP paid"), Topic::Sick);
        assert_eq!(classify("TUPE transfer consultation"), Topic::Tupe);
        assert_eq!(classify("checking right to work documents"), Topic::Visas);
        assert_eq!(classify("redundancy notice period"), Topic::Redundancy);
        assert_eq!(classify("unfair dismissal claims"), Topic::Disciplinary);
        assert_eq!(classify("minimum wage for apprentices"), Topic::WorkingTime);
        assert_eq!(classify("age discrimination at work"), Topic::Equality);
        assert_eq!(classify("health and safety duties"), Topic::HealthSafety);
        assert_eq!(classify("employment contract terms"), Topic::Employment);
    }

    #[test]
    fn first_match_wins() {
        // "pension" is tested before "contract".
        assert_eq!(classify("pension clause in my contract"), Topic::Pensions);
        // "holiday" is tested before "sick".
        assert_eq!(classify("sick during holiday"), Topic::Holiday);
    }

    #[test]
    fn unmatched_queries_default_to_general() {
        assert_eq!(classify("what is the meaning of life"), Topic::General);
        assert_eq!(classify(""), Topic::General);
    }

    #[test]
    fn classification_is_case_insensitive_and_deterministic() {
        for query in [
            "PENSION rules",
            "Pension rules",
            "pension rules",
        ] {
            assert_eq!(classify(query), Topic::Pensions);
        }

        // Total: arbitrary inputs always yield some topic.
        for query in ["", "   ", "日本語のクエリ", "a]b[c"] {
            let _ = classify(query);
        }
    }
}
