//! Password hashing and strength policy.
//!
//! Pure computation over password material: no storage, no transport.
//! Hashing uses Argon2id with the library defaults; verification never
//! distinguishes "bad hash" from "wrong password".

use anyhow::Result;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// One failed strength requirement. All violations for a candidate password
/// are reported together so callers can render a complete checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StrengthViolation {
    TooShort,
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
}

impl StrengthViolation {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::TooShort => "must be at least 8 characters long",
            Self::MissingUppercase => "must contain an uppercase letter",
            Self::MissingLowercase => "must contain a lowercase letter",
            Self::MissingDigit => "must contain a digit",
            Self::MissingSpecial => "must contain a special character",
        }
    }
}

/// Check a candidate password against the strength policy, returning every
/// violation rather than only the first.
#[must_use]
pub fn validate_strength(password: &str) -> Vec<StrengthViolation> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push(StrengthViolation::TooShort);
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push(StrengthViolation::MissingUppercase);
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push(StrengthViolation::MissingLowercase);
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        violations.push(StrengthViolation::MissingDigit);
    }
    if !password
        .chars()
        .any(|ch| !ch.is_alphanumeric() && !ch.is_whitespace())
    {
        violations.push(StrengthViolation::MissingSpecial);
    }
    violations
}

/// Hash a password with Argon2id. Deliberately slow; call from a blocking
/// context.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. Malformed hashes verify as
/// false rather than erroring so callers stay on the generic failure path.
#[must_use]
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_password_reports_every_violation() {
        let violations = validate_strength("abcdefg");
        assert_eq!(
            violations,
            vec![
                StrengthViolation::TooShort,
                StrengthViolation::MissingUppercase,
                StrengthViolation::MissingDigit,
                StrengthViolation::MissingSpecial,
            ]
        );
    }

    #[test]
    fn strong_password_passes() {
        assert!(validate_strength("Abcdef1!").is_empty());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 7 multibyte characters plus the rest of the policy satisfied.
        let violations = validate_strength("Ábcde1!");
        assert_eq!(violations, vec![StrengthViolation::TooShort]);
    }

    #[test]
    fn hash_and_verify_round_trip() -> Result<()> {
        let hash = hash_password("Abcdef1!")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Abcdef1!", &hash));
        assert!(!verify_password("Abcdef1?", &hash));
        Ok(())
    }

    #[test]
    fn malformed_hash_verifies_false() {
        assert!(!verify_password("Abcdef1!", "not-a-hash"));
    }
}
