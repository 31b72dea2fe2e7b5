//! Portal accounts created by completed registrations.
//!
//! Accounts are only ever created and destroyed by the registration state
//! machine; nothing else writes to this store. Username uniqueness is
//! case-insensitive, email uniqueness is on the normalized (lowercased)
//! address.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::roster::Cohort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Back-reference to the owning roster record.
    pub verification_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub section_number: u8,
    pub group: Cohort,
    pub role: Role,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InsertError {
    #[error("username already taken")]
    DuplicateUsername,
    #[error("email already registered")]
    DuplicateEmail,
}

/// Keyed account store. Uniqueness checks and the insert happen under one
/// lock so concurrent registrations cannot both claim a username.
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl AccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new account, enforcing username/email uniqueness.
    pub fn insert(&self, account: Account) -> Result<(), InsertError> {
        let mut accounts = self.accounts.lock().expect("account store poisoned");
        let username = account.username.to_lowercase();
        let email = account.email.to_lowercase();
        for existing in accounts.values() {
            if existing.username.to_lowercase() == username {
                return Err(InsertError::DuplicateUsername);
            }
            if existing.email.to_lowercase() == email {
                return Err(InsertError::DuplicateEmail);
            }
        }
        accounts.insert(account.id, account);
        Ok(())
    }

    /// Fail-fast uniqueness check used before a one-time code is requested.
    /// The insert under lock remains the authoritative check.
    #[must_use]
    pub fn conflict(&self, username: &str, email: &str) -> Option<InsertError> {
        let accounts = self.accounts.lock().expect("account store poisoned");
        let username = username.to_lowercase();
        let email = email.to_lowercase();
        for existing in accounts.values() {
            if existing.username.to_lowercase() == username {
                return Some(InsertError::DuplicateUsername);
            }
            if existing.email.to_lowercase() == email {
                return Some(InsertError::DuplicateEmail);
            }
        }
        None
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Account> {
        self.accounts
            .lock()
            .expect("account store poisoned")
            .get(&id)
            .cloned()
    }

    #[must_use]
    pub fn find_by_username(&self, username: &str) -> Option<Account> {
        let username = username.to_lowercase();
        self.accounts
            .lock()
            .expect("account store poisoned")
            .values()
            .find(|account| account.username.to_lowercase() == username)
            .cloned()
    }

    #[must_use]
    pub fn find_by_verification(&self, verification_id: Uuid) -> Option<Account> {
        self.accounts
            .lock()
            .expect("account store poisoned")
            .values()
            .find(|account| account.verification_id == verification_id)
            .cloned()
    }

    pub fn remove(&self, id: Uuid) -> Option<Account> {
        self.accounts
            .lock()
            .expect("account store poisoned")
            .remove(&id)
    }

    /// Remove every account referencing a roster record. Returns the removed
    /// ids; an empty result is not an error (idempotent unwind).
    pub fn remove_by_verification(&self, verification_id: Uuid) -> Vec<Uuid> {
        let mut accounts = self.accounts.lock().expect("account store poisoned");
        let ids: Vec<Uuid> = accounts
            .values()
            .filter(|account| account.verification_id == verification_id)
            .map(|account| account.id)
            .collect();
        for id in &ids {
            accounts.remove(id);
        }
        ids
    }

    pub fn record_login(&self, id: Uuid, now: OffsetDateTime) {
        let mut accounts = self.accounts.lock().expect("account store poisoned");
        if let Some(account) = accounts.get_mut(&id) {
            account.last_login_at = Some(now);
            account.updated_at = now;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Account> {
        self.accounts
            .lock()
            .expect("account store poisoned")
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.lock().expect("account store poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
