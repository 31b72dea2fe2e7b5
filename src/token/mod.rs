//! Access/refresh token issuance, rotation, and revocation.
//!
//! Access tokens are stateless PASETO v4.public tokens (see [`paseto`]).
//! Refresh tokens are opaque single-use secrets bound to a session family;
//! only their SHA-256 hash is retained. Exchanging a refresh token rotates
//! it, and presenting an already-consumed secret is treated as a stolen
//! token: the whole session family is revoked on the spot.

pub mod paseto;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::warn;
use uuid::Uuid;

use crate::account::Role;
use crate::roster::Cohort;

pub use paseto::{AccessTokenClaims, TokenError, TokenKeys, VerificationOptions};

const DEFAULT_ACCESS_TTL_MINUTES: i64 = 30;
const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;
const REFRESH_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(issuer: String, audience: String) -> Self {
        Self {
            issuer,
            audience,
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

/// Display claims denormalized into the access token.
#[derive(Debug, Clone)]
pub struct ProfileClaims {
    pub full_name: String,
    pub section_number: u8,
    pub group: Cohort,
    pub role: Role,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub issued_at: OffsetDateTime,
    /// Access token expiry; the refresh token outlives it.
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("invalid refresh token")]
    Invalid,
    #[error("refresh token expired")]
    Expired,
    #[error("refresh token reused; session revoked")]
    Reused,
    #[error("session revoked")]
    Revoked,
    #[error("token signing failed")]
    Internal(#[from] TokenError),
}

#[derive(Debug)]
struct SessionFamily {
    user_id: Uuid,
    profile: ProfileClaims,
    current_hash: Vec<u8>,
    consumed_hashes: Vec<Vec<u8>>,
    expires_at: OffsetDateTime,
    revoked: bool,
}

/// Issues, verifies, rotates, and revokes token pairs.
pub struct TokenService {
    keys: TokenKeys,
    config: TokenConfig,
    sessions: Mutex<HashMap<Uuid, SessionFamily>>,
}

impl TokenService {
    #[must_use]
    pub fn new(keys: TokenKeys, config: TokenConfig) -> Self {
        Self {
            keys,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a new session family for `user_id` and issue its first pair.
    ///
    /// # Errors
    ///
    /// Returns an error if access token signing fails.
    pub fn issue(&self, user_id: Uuid, profile: ProfileClaims) -> Result<TokenPair, TokenError> {
        self.issue_at(user_id, profile, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        user_id: Uuid,
        profile: ProfileClaims,
        now: OffsetDateTime,
    ) -> Result<TokenPair, TokenError> {
        let session_id = Uuid::new_v4();
        let secret = mint_refresh_secret();
        let pair = self.mint_pair(user_id, &profile, session_id, &secret, now)?;

        let mut sessions = self.sessions.lock().expect("session store poisoned");
        // Drop families that can no longer refresh. A revoked family only
        // stays until its refresh window closes; after that, reuse of its
        // tokens fails as invalid, so the map stays bounded.
        sessions.retain(|_, family| family.expires_at > now);
        sessions.insert(
            session_id,
            SessionFamily {
                user_id,
                profile,
                current_hash: hash_refresh_secret(&secret),
                consumed_hashes: Vec::new(),
                expires_at: now + self.config.refresh_ttl,
                revoked: false,
            },
        );
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, rotating the secret.
    ///
    /// Reuse of an already-consumed secret revokes the whole session family
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`RefreshError`] describing why the exchange was refused.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        self.refresh_at(refresh_token, OffsetDateTime::now_utc())
    }

    pub(crate) fn refresh_at(
        &self,
        refresh_token: &str,
        now: OffsetDateTime,
    ) -> Result<TokenPair, RefreshError> {
        let (session_id, secret) = parse_refresh_token(refresh_token)?;
        let presented_hash = hash_refresh_secret(&secret);

        let (user_id, profile, next_secret) = {
            let mut sessions = self.sessions.lock().expect("session store poisoned");
            let family = sessions.get_mut(&session_id).ok_or(RefreshError::Invalid)?;

            if family.revoked {
                return Err(RefreshError::Revoked);
            }
            if family.expires_at <= now {
                return Err(RefreshError::Expired);
            }
            if family.current_hash != presented_hash {
                if family.consumed_hashes.contains(&presented_hash) {
                    // A consumed secret resurfacing means it leaked; kill
                    // the whole family rather than just this exchange.
                    family.revoked = true;
                    warn!(%session_id, "consumed refresh token reused; revoking session family");
                    return Err(RefreshError::Reused);
                }
                return Err(RefreshError::Invalid);
            }

            let next_secret = mint_refresh_secret();
            let old_hash = std::mem::replace(
                &mut family.current_hash,
                hash_refresh_secret(&next_secret),
            );
            family.consumed_hashes.push(old_hash);
            family.expires_at = now + self.config.refresh_ttl;
            (family.user_id, family.profile.clone(), next_secret)
        };

        // Signing happens outside the lock; a failure here leaves the
        // rotation in place, so the caller just refreshes again.
        Ok(self.mint_pair(user_id, &profile, session_id, &next_secret, now)?)
    }

    /// Verify an access token. Pure signature + expiry check, no store
    /// access.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or foreign.
    pub fn verify(&self, access_token: &str) -> Result<AccessTokenClaims, TokenError> {
        self.verify_at(access_token, OffsetDateTime::now_utc())
    }

    pub(crate) fn verify_at(
        &self,
        access_token: &str,
        now: OffsetDateTime,
    ) -> Result<AccessTokenClaims, TokenError> {
        paseto::verify_access_token(
            &self.keys,
            access_token,
            &VerificationOptions {
                expected_issuer: &self.config.issuer,
                expected_audience: &self.config.audience,
                now,
            },
        )
    }

    /// Owner of a live session family, if any.
    #[must_use]
    pub fn session_user(&self, session_id: Uuid) -> Option<Uuid> {
        self.sessions
            .lock()
            .expect("session store poisoned")
            .get(&session_id)
            .filter(|family| !family.revoked)
            .map(|family| family.user_id)
    }

    /// Permanently revoke a session family. Returns whether it existed.
    pub fn revoke(&self, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        match sessions.get_mut(&session_id) {
            Some(family) => {
                family.revoked = true;
                true
            }
            None => false,
        }
    }

    fn mint_pair(
        &self,
        user_id: Uuid,
        profile: &ProfileClaims,
        session_id: Uuid,
        refresh_secret: &str,
        now: OffsetDateTime,
    ) -> Result<TokenPair, TokenError> {
        let expires_at = now + self.config.access_ttl;
        let claims = AccessTokenClaims {
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: paseto::rfc3339(now)?,
            exp: paseto::rfc3339(expires_at)?,
            role: profile.role,
            full_name: profile.full_name.clone(),
            section_number: profile.section_number,
            group: profile.group,
        };
        let access_token = paseto::sign_access_token(&self.keys, &claims)?;
        Ok(TokenPair {
            access_token,
            refresh_token: format!("{session_id}.{refresh_secret}"),
            session_id,
            issued_at: now,
            expires_at,
        })
    }
}

fn mint_refresh_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Only the hash of a refresh secret is retained server-side.
fn hash_refresh_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn parse_refresh_token(token: &str) -> Result<(Uuid, String), RefreshError> {
    let (session_id, secret) = token.split_once('.').ok_or(RefreshError::Invalid)?;
    let session_id = session_id.parse().map_err(|_| RefreshError::Invalid)?;
    if secret.is_empty() {
        return Err(RefreshError::Invalid);
    }
    Ok((session_id, secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        let keys = TokenKeys::from_seed(&[7u8; 32]).expect("keys");
        TokenService::new(
            keys,
            TokenConfig::new(
                "https://matrikulo.test".to_string(),
                "matrikulo-portal".to_string(),
            ),
        )
    }

    fn profile() -> ProfileClaims {
        ProfileClaims {
            full_name: "Jane Doe".to_string(),
            section_number: 3,
            group: Cohort::GroupOne,
            role: Role::Student,
        }
    }

    #[test]
    fn issue_then_verify_carries_profile_claims() -> anyhow::Result<()> {
        let service = service();
        let user_id = Uuid::new_v4();
        let pair = service.issue(user_id, profile())?;

        let claims = service.verify(&pair.access_token)?;
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.sid, pair.session_id.to_string());
        assert_eq!(claims.full_name, "Jane Doe");
        assert_eq!(claims.role, Role::Student);
        Ok(())
    }

    #[test]
    fn refresh_rotates_the_secret() -> anyhow::Result<()> {
        let service = service();
        let pair = service.issue(Uuid::new_v4(), profile())?;

        let rotated = service.refresh(&pair.refresh_token)?;
        assert_eq!(rotated.session_id, pair.session_id);
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // The rotated token keeps working.
        let again = service.refresh(&rotated.refresh_token)?;
        assert_eq!(again.session_id, pair.session_id);
        Ok(())
    }

    #[test]
    fn reusing_consumed_refresh_token_revokes_the_family() -> anyhow::Result<()> {
        let service = service();
        let pair = service.issue(Uuid::new_v4(), profile())?;
        let rotated = service.refresh(&pair.refresh_token)?;

        // Second exchange of the original token is the theft signal.
        let reuse = service.refresh(&pair.refresh_token);
        assert!(matches!(reuse, Err(RefreshError::Reused)));

        // The whole family is dead, including the newest token.
        let follow_up = service.refresh(&rotated.refresh_token);
        assert!(matches!(follow_up, Err(RefreshError::Revoked)));
        Ok(())
    }

    #[test]
    fn revoke_is_permanent() -> anyhow::Result<()> {
        let service = service();
        let pair = service.issue(Uuid::new_v4(), profile())?;

        assert!(service.revoke(pair.session_id));
        let result = service.refresh(&pair.refresh_token);
        assert!(matches!(result, Err(RefreshError::Revoked)));
        assert!(!service.revoke(Uuid::new_v4()));
        Ok(())
    }

    #[test]
    fn revoked_family_is_swept_once_its_window_closes() -> anyhow::Result<()> {
        let service = service();
        let now = OffsetDateTime::now_utc();
        let pair = service.issue_at(Uuid::new_v4(), profile(), now)?;
        service.refresh_at(&pair.refresh_token, now)?;

        // Reuse revokes the family, and it keeps answering as revoked while
        // its refresh window is still open.
        assert!(matches!(
            service.refresh_at(&pair.refresh_token, now),
            Err(RefreshError::Reused)
        ));
        assert!(matches!(
            service.refresh_at(&pair.refresh_token, now),
            Err(RefreshError::Revoked)
        ));

        // A later issue sweeps the expired family out of the store; its
        // tokens still fail, now as unknown.
        let later = now + Duration::days(8);
        service.issue_at(Uuid::new_v4(), profile(), later)?;
        assert!(matches!(
            service.refresh_at(&pair.refresh_token, later),
            Err(RefreshError::Invalid)
        ));
        Ok(())
    }

    #[test]
    fn expired_family_cannot_refresh() -> anyhow::Result<()> {
        let service = service();
        let now = OffsetDateTime::now_utc();
        let pair = service.issue_at(Uuid::new_v4(), profile(), now)?;

        let much_later = now + Duration::days(8);
        let result = service.refresh_at(&pair.refresh_token, much_later);
        assert!(matches!(result, Err(RefreshError::Expired)));
        Ok(())
    }

    #[test]
    fn malformed_refresh_tokens_are_invalid() {
        let service = service();
        for token in ["", "no-dot", "not-a-uuid.secret", "9f8b7c0a.", "."] {
            assert!(
                matches!(service.refresh(token), Err(RefreshError::Invalid)),
                "token {token:?} should be invalid"
            );
        }
    }
}
