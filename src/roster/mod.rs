//! Verification roster: the pre-loaded list of people eligible to register.
//!
//! The roster is the root of the registration lifecycle. Accounts reference a
//! roster record via `verification_id`, and `is_registered` on a record is
//! true exactly when one active account holds that reference. All flips of
//! the registration flag go through [`RosterStore::try_register`] and
//! [`RosterStore::clear_registration`] so the check-then-write stays atomic
//! per record.

pub mod matcher;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

pub const SECTION_MIN: u8 = 1;
pub const SECTION_MAX: u8 = 15;

/// One of the two fixed cohorts a roster entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Cohort {
    #[serde(rename = "Group 1")]
    GroupOne,
    #[serde(rename = "Group 2")]
    GroupTwo,
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroupOne => write!(f, "Group 1"),
            Self::GroupTwo => write!(f, "Group 2"),
        }
    }
}

impl FromStr for Cohort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Group 1" => Ok(Self::GroupOne),
            "Group 2" => Ok(Self::GroupTwo),
            other => Err(format!("unknown cohort: {other}")),
        }
    }
}

/// One authoritative roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub full_name: String,
    /// Lowercased, diacritics stripped, internal whitespace collapsed.
    pub normalized_name: String,
    pub section_number: u8,
    pub group: Cohort,
    pub student_id: Option<String>,
    pub email: Option<String>,
    pub is_registered: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub registered_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Input tuple for the administrative bulk import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub full_name: String,
    pub section_number: u8,
    pub group: Cohort,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Per-entry results for a bulk import.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub loaded: usize,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("roster record not found")]
    NotFound,
    #[error("roster record already registered")]
    AlreadyRegistered,
}

/// Keyed store of [`VerificationRecord`]s with atomic per-record updates.
#[derive(Debug, Default)]
pub struct RosterStore {
    records: Mutex<HashMap<Uuid, VerificationRecord>>,
}

impl RosterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load entries. Entries with an out-of-range section are rejected
    /// and reported, they never abort the rest of the import.
    pub fn import(&self, entries: Vec<RosterEntry>) -> ImportReport {
        let now = OffsetDateTime::now_utc();
        let mut report = ImportReport::default();
        let mut records = self.records.lock().expect("roster store poisoned");
        for entry in entries {
            if !(SECTION_MIN..=SECTION_MAX).contains(&entry.section_number) {
                report.rejected.push(format!(
                    "{}: section {} out of range",
                    entry.full_name, entry.section_number
                ));
                continue;
            }
            let record = VerificationRecord {
                id: Uuid::new_v4(),
                normalized_name: matcher::normalize_name(&entry.full_name),
                full_name: entry.full_name,
                section_number: entry.section_number,
                group: entry.group,
                student_id: entry.student_id,
                email: entry.email,
                is_registered: false,
                registered_at: None,
                created_at: now,
                updated_at: now,
            };
            records.insert(record.id, record);
            report.loaded += 1;
        }
        report
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<VerificationRecord> {
        self.records
            .lock()
            .expect("roster store poisoned")
            .get(&id)
            .cloned()
    }

    /// Point-in-time copy of the roster, used by the matcher.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VerificationRecord> {
        self.records
            .lock()
            .expect("roster store poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Flip a record to registered, failing if it already is. The re-check
    /// and the write happen under one lock so two concurrent registrations
    /// for the same record cannot both win.
    pub fn try_register(&self, id: Uuid, now: OffsetDateTime) -> Result<(), RegisterError> {
        let mut records = self.records.lock().expect("roster store poisoned");
        let record = records.get_mut(&id).ok_or(RegisterError::NotFound)?;
        if record.is_registered {
            return Err(RegisterError::AlreadyRegistered);
        }
        record.is_registered = true;
        record.registered_at = Some(now);
        record.updated_at = now;
        Ok(())
    }

    /// Reset the registration flag. Idempotent: clearing an unregistered or
    /// unknown record is a no-op, returns whether the record exists.
    pub fn clear_registration(&self, id: Uuid) -> bool {
        let mut records = self.records.lock().expect("roster store poisoned");
        match records.get_mut(&id) {
            Some(record) => {
                if record.is_registered {
                    record.is_registered = false;
                    record.registered_at = None;
                    record.updated_at = OffsetDateTime::now_utc();
                }
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().expect("roster store poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, section: u8, group: Cohort) -> RosterEntry {
        RosterEntry {
            full_name: name.to_string(),
            section_number: section,
            group,
            student_id: None,
            email: None,
        }
    }

    #[test]
    fn import_loads_and_normalizes() {
        let store = RosterStore::new();
        let report = store.import(vec![entry("  Jane   Doe ", 3, Cohort::GroupOne)]);
        assert_eq!(report.loaded, 1);
        assert!(report.rejected.is_empty());

        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].normalized_name, "jane doe");
        assert!(!records[0].is_registered);
    }

    #[test]
    fn import_rejects_out_of_range_section_without_aborting() {
        let store = RosterStore::new();
        let report = store.import(vec![
            entry("Jane Doe", 3, Cohort::GroupOne),
            entry("John Roe", 16, Cohort::GroupTwo),
        ]);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn try_register_is_single_shot() {
        let store = RosterStore::new();
        store.import(vec![entry("Jane Doe", 3, Cohort::GroupOne)]);
        let id = store.snapshot()[0].id;
        let now = OffsetDateTime::now_utc();

        assert_eq!(store.try_register(id, now), Ok(()));
        assert_eq!(
            store.try_register(id, now),
            Err(RegisterError::AlreadyRegistered)
        );
        let record = store.get(id).expect("record");
        assert!(record.is_registered);
        assert!(record.registered_at.is_some());
    }

    #[test]
    fn clear_registration_is_idempotent() {
        let store = RosterStore::new();
        store.import(vec![entry("Jane Doe", 3, Cohort::GroupOne)]);
        let id = store.snapshot()[0].id;
        store
            .try_register(id, OffsetDateTime::now_utc())
            .expect("register");

        assert!(store.clear_registration(id));
        assert!(store.clear_registration(id));
        let record = store.get(id).expect("record");
        assert!(!record.is_registered);
        assert!(record.registered_at.is_none());
    }

    #[test]
    fn try_register_unknown_record() {
        let store = RosterStore::new();
        assert_eq!(
            store.try_register(Uuid::new_v4(), OffsetDateTime::now_utc()),
            Err(RegisterError::NotFound)
        );
        assert!(!store.clear_registration(Uuid::new_v4()));
    }

    #[test]
    fn cohort_round_trips_through_display() {
        for group in [Cohort::GroupOne, Cohort::GroupTwo] {
            let parsed: Cohort = group.to_string().parse().expect("parse cohort");
            assert_eq!(parsed, group);
        }
        assert!("Group 3".parse::<Cohort>().is_err());
    }
}
