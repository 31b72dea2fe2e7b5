//! One-time-code gate contract for registration confirmation.
//!
//! The core only needs two things from the notifier: request a code for an
//! email and check a presented code, with the gate owning code expiry.
//! Delivery itself (mail, SMS) is the notifier's business. Failures from a
//! real notifier are transient, not rejections, so the trait returns
//! `anyhow::Result` and the registrar maps errors accordingly.

use anyhow::{Context, Result};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};
use tracing::info;

const CODE_DIGITS: u32 = 6;
const DEFAULT_CODE_TTL_MINUTES: i64 = 10;

/// Outcome of checking a presented code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Confirmed,
    Expired,
    Invalid,
}

pub trait CodeGate: Send + Sync {
    /// Generate and deliver a code for `email`.
    ///
    /// # Errors
    ///
    /// Returns an error when the notifier is unavailable (transient).
    fn request(&self, email: &str) -> Result<()>;

    /// Check a presented code. Freshness is re-validated here, at
    /// confirmation time, never trusted from the caller.
    ///
    /// # Errors
    ///
    /// Returns an error when the notifier is unavailable (transient).
    fn confirm(&self, email: &str, code: &str) -> Result<CodeCheck>;
}

#[derive(Debug)]
struct IssuedCode {
    code: String,
    expires_at: OffsetDateTime,
}

/// In-memory gate that "delivers" codes through the log, for single-node
/// and development setups. Codes are single-use and expire.
#[derive(Debug)]
pub struct MemoryCodeGate {
    ttl: Duration,
    codes: Mutex<HashMap<String, IssuedCode>>,
}

impl Default for MemoryCodeGate {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_CODE_TTL_MINUTES))
    }
}

impl MemoryCodeGate {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    /// Test hook: fetch the currently issued code for an email.
    #[must_use]
    pub fn issued_code(&self, email: &str) -> Option<String> {
        self.codes
            .lock()
            .expect("code gate poisoned")
            .get(&email.to_lowercase())
            .map(|issued| issued.code.clone())
    }
}

impl CodeGate for MemoryCodeGate {
    fn request(&self, email: &str) -> Result<()> {
        let code = format!(
            "{:06}",
            rand::thread_rng().gen_range(0..10u32.pow(CODE_DIGITS))
        );
        let now = OffsetDateTime::now_utc();
        let mut codes = self.codes.lock().expect("code gate poisoned");
        codes.retain(|_, issued| issued.expires_at > now);
        codes.insert(
            email.to_lowercase(),
            IssuedCode {
                code: code.clone(),
                expires_at: now + self.ttl,
            },
        );
        drop(codes);
        // Stand-in for out-of-band delivery.
        info!(email, code, "one-time code issued");
        Ok(())
    }

    fn confirm(&self, email: &str, code: &str) -> Result<CodeCheck> {
        let now = OffsetDateTime::now_utc();
        let mut codes = self.codes.lock().expect("code gate poisoned");
        let key = email.to_lowercase();
        let Some(issued) = codes.get(&key) else {
            return Ok(CodeCheck::Invalid);
        };
        if issued.expires_at <= now {
            codes.remove(&key);
            return Ok(CodeCheck::Expired);
        }
        if issued.code != code.trim() {
            return Ok(CodeCheck::Invalid);
        }
        codes.remove(&key);
        Ok(CodeCheck::Confirmed)
    }
}

/// Gate that always fails, standing in for an unreachable notifier in
/// tests.
#[derive(Debug, Default)]
pub struct UnavailableCodeGate;

impl CodeGate for UnavailableCodeGate {
    fn request(&self, _email: &str) -> Result<()> {
        Err(anyhow::anyhow!("notifier unavailable")).context("failed to request one-time code")
    }

    fn confirm(&self, _email: &str, _code: &str) -> Result<CodeCheck> {
        Err(anyhow::anyhow!("notifier unavailable")).context("failed to confirm one-time code")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_then_confirm_consumes_the_code() -> Result<()> {
        let gate = MemoryCodeGate::default();
        gate.request("jane@example.com")?;
        let code = gate.issued_code("jane@example.com").expect("code issued");

        assert_eq!(gate.confirm("Jane@Example.com", &code)?, CodeCheck::Confirmed);
        // Single use.
        assert_eq!(gate.confirm("jane@example.com", &code)?, CodeCheck::Invalid);
        Ok(())
    }

    #[test]
    fn wrong_code_is_invalid_but_not_consumed() -> Result<()> {
        let gate = MemoryCodeGate::default();
        gate.request("jane@example.com")?;
        assert_eq!(gate.confirm("jane@example.com", "000000")?, CodeCheck::Invalid);

        let code = gate.issued_code("jane@example.com").expect("still issued");
        assert_eq!(gate.confirm("jane@example.com", &code)?, CodeCheck::Confirmed);
        Ok(())
    }

    #[test]
    fn expired_code_reports_expired() -> Result<()> {
        let gate = MemoryCodeGate::new(Duration::minutes(-1));
        gate.request("jane@example.com")?;
        let code = gate.issued_code("jane@example.com").unwrap_or_default();
        assert_eq!(gate.confirm("jane@example.com", &code)?, CodeCheck::Expired);
        Ok(())
    }

    #[test]
    fn re_request_replaces_the_code() -> Result<()> {
        let gate = MemoryCodeGate::default();
        gate.request("jane@example.com")?;
        let first = gate.issued_code("jane@example.com").expect("first");
        gate.request("jane@example.com")?;
        let second = gate.issued_code("jane@example.com").expect("second");

        if first != second {
            assert_eq!(gate.confirm("jane@example.com", &first)?, CodeCheck::Invalid);
        }
        assert_eq!(gate.confirm("jane@example.com", &second)?, CodeCheck::Confirmed);
        Ok(())
    }
}
