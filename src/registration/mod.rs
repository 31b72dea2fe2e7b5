//! Registration state machine.
//!
//! Orchestrates the matcher, the credential policy, and the one-time-code
//! gate to take a roster entry from unregistered to registered, and unwinds
//! that link for admin operations. The roster and account stores are only
//! ever written through the transitions here.
//!
//! States: `UNREGISTERED → VERIFYING → CODE_PENDING → REGISTERED`, plus the
//! admin-driven `REGISTERED → UNREGISTERED` unwind. `CODE_PENDING` lives in
//! a TTL'd pending map owned by the registrar, never on the roster record,
//! so an abandoned registration cannot pollute the roster.

pub mod code;

use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::account::{Account, AccountStore, Role};
use crate::credential::{self, StrengthViolation};
use crate::roster::matcher::{self, MatchOutcome, Suggestion};
use crate::roster::{Cohort, RegisterError, RosterStore};
use code::{CodeCheck, CodeGate};

const DEFAULT_PENDING_TTL_MINUTES: i64 = 15;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("no matching roster entry")]
    NoMatch { suggestions: Vec<Suggestion> },
    #[error("roster entry already registered")]
    AlreadyRegistered,
    #[error("password violates the strength policy")]
    WeakPassword(Vec<StrengthViolation>),
    #[error("invalid username")]
    InvalidUsername,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("username or email already in use")]
    DuplicateIdentity,
    #[error("one-time code expired")]
    CodeExpired,
    #[error("one-time code invalid")]
    CodeInvalid,
    #[error("dependency unavailable")]
    Transient(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum AdminDeleteError {
    #[error("account not found")]
    AccountNotFound,
}

/// Result of an idempotent unregister: what actually had to be unwound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindOutcome {
    pub removed_accounts: usize,
    pub roster_record_found: bool,
}

#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub id: Uuid,
    pub reason: String,
}

/// Per-record results of a bulk reset; one record failing never aborts the
/// rest of the batch.
#[derive(Debug, Default)]
pub struct BulkResetReport {
    pub succeeded: usize,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone)]
struct PendingRegistration {
    verification_id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    created_at: OffsetDateTime,
}

/// The registration state machine.
pub struct Registrar {
    roster: Arc<RosterStore>,
    accounts: Arc<AccountStore>,
    gate: Arc<dyn CodeGate>,
    pending: Mutex<HashMap<Uuid, PendingRegistration>>,
    pending_ttl: Duration,
}

impl Registrar {
    #[must_use]
    pub fn new(
        roster: Arc<RosterStore>,
        accounts: Arc<AccountStore>,
        gate: Arc<dyn CodeGate>,
    ) -> Self {
        Self {
            roster,
            accounts,
            gate,
            pending: Mutex::new(HashMap::new()),
            pending_ttl: Duration::minutes(DEFAULT_PENDING_TTL_MINUTES),
        }
    }

    #[must_use]
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// `UNREGISTERED → VERIFYING`: match a claimed identity against the
    /// roster. Pure read; persists nothing. Registration status of a match
    /// is reported, not judged, so callers can render "already registered"
    /// distinctly from "no match".
    #[must_use]
    pub fn verify_identity(
        &self,
        claimed_name: &str,
        section_number: u8,
        group: Cohort,
    ) -> MatchOutcome {
        matcher::match_identity(&self.roster.snapshot(), claimed_name, section_number, group)
    }

    /// `VERIFYING → CODE_PENDING`: validate account fields, hash the
    /// password, request a one-time code, and hold the pending registration
    /// under a TTL. The roster stays untouched.
    ///
    /// # Errors
    ///
    /// Fails fast on unknown/already-registered roster ids, strength-policy
    /// violations, malformed email, and duplicate username/email. Notifier
    /// failures surface as [`RegistrationError::Transient`].
    pub async fn begin_registration(
        &self,
        verification_id: Uuid,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Uuid, RegistrationError> {
        // Re-fetch rather than trust an id from an earlier verify response;
        // the roster may have changed in between.
        let record = self
            .roster
            .get(verification_id)
            .ok_or(RegistrationError::NoMatch {
                suggestions: Vec::new(),
            })?;
        if record.is_registered {
            return Err(RegistrationError::AlreadyRegistered);
        }

        let username = username.trim();
        if username.is_empty() {
            return Err(RegistrationError::InvalidUsername);
        }
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(RegistrationError::InvalidEmail);
        }

        let violations = credential::validate_strength(password);
        if !violations.is_empty() {
            return Err(RegistrationError::WeakPassword(violations));
        }

        // Advisory fast check; the insert at confirm time is authoritative.
        if self.accounts.conflict(username, &email).is_some() {
            return Err(RegistrationError::DuplicateIdentity);
        }

        // Hashing is deliberately slow; keep it off the async workers.
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || credential::hash_password(&password))
            .await
            .map_err(|err| RegistrationError::Transient(anyhow!(err)))?
            .map_err(RegistrationError::Transient)?;

        self.gate
            .request(&email)
            .map_err(RegistrationError::Transient)?;

        let pending_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let mut pending = self.pending.lock().expect("pending store poisoned");
        pending.retain(|_, entry| now - entry.created_at < self.pending_ttl);
        pending.insert(
            pending_id,
            PendingRegistration {
                verification_id,
                username: username.to_string(),
                email,
                password_hash,
                created_at: now,
            },
        );
        drop(pending);

        info!(%verification_id, %pending_id, "registration pending code confirmation");
        Ok(pending_id)
    }

    /// `CODE_PENDING → REGISTERED`: confirm the one-time code and perform
    /// the single atomic unit of the whole flow. The roster flag flip is a
    /// compare-and-set, so two concurrent confirmations for the same roster
    /// entry produce exactly one account.
    ///
    /// # Errors
    ///
    /// Expired or unknown pending registrations and expired codes return
    /// [`RegistrationError::CodeExpired`]; a wrong code returns
    /// [`RegistrationError::CodeInvalid`] and leaves the pending
    /// registration retryable. Losing the roster race returns
    /// [`RegistrationError::AlreadyRegistered`] with no partial state.
    pub fn confirm_registration(
        &self,
        pending_id: Uuid,
        presented_code: &str,
    ) -> Result<Uuid, RegistrationError> {
        let now = OffsetDateTime::now_utc();
        let entry = {
            let mut pending = self.pending.lock().expect("pending store poisoned");
            let Some(entry) = pending.get(&pending_id) else {
                return Err(RegistrationError::CodeExpired);
            };
            if now - entry.created_at >= self.pending_ttl {
                pending.remove(&pending_id);
                return Err(RegistrationError::CodeExpired);
            }
            entry.clone()
        };

        match self
            .gate
            .confirm(&entry.email, presented_code)
            .map_err(RegistrationError::Transient)?
        {
            CodeCheck::Confirmed => {}
            CodeCheck::Expired => {
                self.pending
                    .lock()
                    .expect("pending store poisoned")
                    .remove(&pending_id);
                return Err(RegistrationError::CodeExpired);
            }
            // Wrong code: keep the pending registration so the caller can
            // retry with the right one.
            CodeCheck::Invalid => return Err(RegistrationError::CodeInvalid),
        }

        let record = match self.roster.try_register(entry.verification_id, now) {
            Ok(()) => self
                .roster
                .get(entry.verification_id)
                .ok_or(RegistrationError::NoMatch {
                    suggestions: Vec::new(),
                })?,
            Err(RegisterError::AlreadyRegistered) => {
                return Err(RegistrationError::AlreadyRegistered)
            }
            Err(RegisterError::NotFound) => {
                return Err(RegistrationError::NoMatch {
                    suggestions: Vec::new(),
                })
            }
        };

        let account = Account {
            id: Uuid::new_v4(),
            verification_id: entry.verification_id,
            username: entry.username.clone(),
            email: entry.email.clone(),
            password_hash: entry.password_hash.clone(),
            full_name: record.full_name,
            section_number: record.section_number,
            group: record.group,
            role: Role::Student,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        let account_id = account.id;

        if let Err(err) = self.accounts.insert(account) {
            // Lost a duplicate race after winning the roster one; roll the
            // flag back so no partial state survives.
            self.roster.clear_registration(entry.verification_id);
            error!(%pending_id, "account insert failed after roster flip: {err}");
            return Err(RegistrationError::DuplicateIdentity);
        }

        self.pending
            .lock()
            .expect("pending store poisoned")
            .remove(&pending_id);

        info!(
            verification_id = %entry.verification_id,
            %account_id,
            "registration completed"
        );
        Ok(account_id)
    }

    /// `REGISTERED → UNREGISTERED`, keyed by roster record. Idempotent:
    /// unwinding an already-unregistered record is a no-op success so admin
    /// retries after ambiguous failures stay safe.
    pub fn unregister(&self, verification_id: Uuid) -> UnwindOutcome {
        let removed = self.accounts.remove_by_verification(verification_id);
        let roster_record_found = self.roster.clear_registration(verification_id);
        if !roster_record_found {
            warn!(%verification_id, "unregister for unknown roster record");
        }
        for account_id in &removed {
            info!(%verification_id, %account_id, "account removed by unregister");
        }
        UnwindOutcome {
            removed_accounts: removed.len(),
            roster_record_found,
        }
    }

    /// Same unwind keyed by account id. A missing roster back-reference is
    /// logged as an inconsistency but never fails the delete.
    ///
    /// # Errors
    ///
    /// Returns [`AdminDeleteError::AccountNotFound`] when the account does
    /// not exist; admins get verbose errors.
    pub fn delete_account(&self, account_id: Uuid) -> Result<(), AdminDeleteError> {
        let account = self
            .accounts
            .remove(account_id)
            .ok_or(AdminDeleteError::AccountNotFound)?;
        if !self.roster.clear_registration(account.verification_id) {
            warn!(
                %account_id,
                verification_id = %account.verification_id,
                "deleted account referenced a missing roster record"
            );
        }
        info!(%account_id, "account deleted");
        Ok(())
    }

    /// Delete every account and reset its roster record, independently per
    /// record. Failures are collected, never fatal to the batch.
    pub fn bulk_reset(&self) -> BulkResetReport {
        let mut report = BulkResetReport::default();
        for account in self.accounts.snapshot() {
            match self.delete_account(account.id) {
                Ok(()) => report.succeeded += 1,
                Err(err) => report.failed.push(BulkFailure {
                    id: account.id,
                    reason: err.to_string(),
                }),
            }
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "bulk reset finished"
        );
        report
    }

    #[must_use]
    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }
}

/// Normalize an email for lookup and uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic format check on an already-normalized email.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .is_ok_and(|regex| regex.is_match(email_normalized))
}
