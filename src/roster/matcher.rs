//! Claimed-identity matching against the roster.
//!
//! Pure functions over a roster snapshot. An exact normalized-name hit inside
//! the claimed `(section, group)` bucket is the only valid match; a name that
//! exists in a different bucket is a non-match so nobody can claim another
//! section's slot by knowing the name alone. Non-matches come back with
//! ranked "did you mean" suggestions carrying each candidate's real bucket.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

use super::{Cohort, VerificationRecord};

/// How many ranked suggestions a non-match carries.
pub const SUGGESTION_LIMIT: usize = 5;

/// A ranked near-miss, with the candidate's real bucket for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub full_name: String,
    pub section_number: u8,
    pub group: Cohort,
}

/// Result of matching a claimed identity against the roster.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Present only on an exact in-bucket match.
    pub matched: Option<VerificationRecord>,
    /// Ranked near-misses; empty when `matched` is set.
    pub suggestions: Vec<Suggestion>,
}

impl MatchOutcome {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.matched.is_some()
    }
}

/// Normalize a claimed or roster name for comparison: trim, lowercase,
/// collapse internal whitespace, strip diacritics.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match a claimed `(name, section, group)` against a roster snapshot.
///
/// Registration status is deliberately ignored here; the registration state
/// machine decides what an already-registered match means.
#[must_use]
pub fn match_identity(
    records: &[VerificationRecord],
    claimed_name: &str,
    section_number: u8,
    group: Cohort,
) -> MatchOutcome {
    let normalized = normalize_name(claimed_name);

    let matched = records
        .iter()
        .find(|record| {
            record.section_number == section_number
                && record.group == group
                && record.normalized_name == normalized
        })
        .cloned();

    if matched.is_some() {
        return MatchOutcome {
            matched,
            suggestions: Vec::new(),
        };
    }

    // Suggestions are ranked over the whole roster, not just the claimed
    // bucket, so a typo'd section still surfaces the right person.
    let mut ranked: Vec<(usize, &VerificationRecord)> = records
        .iter()
        .map(|record| (strsim::levenshtein(&normalized, &record.normalized_name), record))
        .collect();
    ranked.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.normalized_name.cmp(&b.1.normalized_name))
            .then_with(|| a.1.section_number.cmp(&b.1.section_number))
    });

    let suggestions = ranked
        .into_iter()
        .take(SUGGESTION_LIMIT)
        .map(|(_, record)| Suggestion {
            full_name: record.full_name.clone(),
            section_number: record.section_number,
            group: record.group,
        })
        .collect();

    MatchOutcome {
        matched: None,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{RosterEntry, RosterStore};

    fn roster() -> Vec<VerificationRecord> {
        let store = RosterStore::new();
        store.import(vec![
            RosterEntry {
                full_name: "Jane Doe".to_string(),
                section_number: 3,
                group: Cohort::GroupOne,
                student_id: None,
                email: None,
            },
            RosterEntry {
                full_name: "José Álvarez".to_string(),
                section_number: 7,
                group: Cohort::GroupTwo,
                student_id: None,
                email: None,
            },
            RosterEntry {
                full_name: "Jane Doherty".to_string(),
                section_number: 5,
                group: Cohort::GroupOne,
                student_id: None,
                email: None,
            },
        ]);
        store.snapshot()
    }

    #[test]
    fn normalize_name_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  Jane   DOE "), "jane doe");
    }

    #[test]
    fn normalize_name_strips_diacritics() {
        assert_eq!(normalize_name("José Álvarez"), "jose alvarez");
    }

    #[test]
    fn exact_match_inside_bucket() {
        let records = roster();
        let outcome = match_identity(&records, "jane   doe", 3, Cohort::GroupOne);
        assert!(outcome.is_valid());
        assert!(outcome.suggestions.is_empty());
        assert_eq!(
            outcome.matched.map(|record| record.full_name),
            Some("Jane Doe".to_string())
        );
    }

    #[test]
    fn same_name_different_bucket_is_no_match() {
        let records = roster();
        let outcome = match_identity(&records, "Jane Doe", 4, Cohort::GroupOne);
        assert!(!outcome.is_valid());
        // The right person must still show up in suggestions, with her real bucket.
        let top = outcome.suggestions.first().expect("at least one suggestion");
        assert_eq!(top.full_name, "Jane Doe");
        assert_eq!(top.section_number, 3);
        assert_eq!(top.group, Cohort::GroupOne);
    }

    #[test]
    fn diacritic_insensitive_match() {
        let records = roster();
        let outcome = match_identity(&records, "jose alvarez", 7, Cohort::GroupTwo);
        assert!(outcome.is_valid());
    }

    #[test]
    fn suggestions_ranked_by_distance_and_capped() {
        let records = roster();
        let outcome = match_identity(&records, "Jane Do", 3, Cohort::GroupOne);
        assert!(!outcome.is_valid());
        assert!(outcome.suggestions.len() <= SUGGESTION_LIMIT);
        assert_eq!(outcome.suggestions[0].full_name, "Jane Doe");
    }

    #[test]
    fn registered_records_still_match() {
        let store = RosterStore::new();
        store.import(vec![RosterEntry {
            full_name: "Jane Doe".to_string(),
            section_number: 3,
            group: Cohort::GroupOne,
            student_id: None,
            email: None,
        }]);
        let id = store.snapshot()[0].id;
        store
            .try_register(id, time::OffsetDateTime::now_utc())
            .expect("register");

        let outcome = match_identity(&store.snapshot(), "Jane Doe", 3, Cohort::GroupOne);
        assert!(outcome.is_valid());
        assert!(outcome.matched.expect("matched").is_registered);
    }
}
