//! # Matrikulo (Student-Portal Identity Core)
//!
//! `matrikulo` gates account creation on a pre-loaded student roster. It
//! handles fuzzy identity verification, one-time-code registration, password
//! login with progressive rate limiting, and PASETO-based session tokens.
//!
//! ## Roster Model
//!
//! The roster is the source of truth for who may register. Each record is a
//! `(fullName, sectionNumber, group)` identity plus an `is_registered` flag;
//! a record can back at most one account at a time.
//!
//! - **Name Normalization:** Claimed and roster names are compared after
//!   trimming, lowercasing, whitespace collapsing, and diacritic stripping.
//! - **Suggestions:** A failed verification returns up to five ranked
//!   near-misses by edit distance, never the records' ids.
//! - **Admin Unwind:** Unregistering a record or deleting its account resets
//!   the flag so the person can register again.
//!
//! ## Sessions
//!
//! Access tokens are stateless `PASETO` v4.public tokens carrying denormalized
//! profile claims. Refresh tokens are opaque, stored only as hashes, rotated
//! on every use; reusing a consumed refresh token revokes its whole session
//! family.
//!
//! Login failures share one generic message and a minimum response time, so
//! the API never confirms whether a username exists.

pub mod account;
pub mod api;
pub mod cli;
pub mod credential;
pub mod rate_limit;
pub mod registration;
pub mod roster;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
