//! PASETO v4.public access tokens.
//!
//! Access tokens are stateless: verification is a pure signature + claim
//! check against the service keypair, so request handling never touches a
//! store. The key id travels in the token footer as a PASERK ID.

use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::SigningKey;
use pasetors::errors::Error as PasetorsError;
use pasetors::footer::Footer;
use pasetors::keys::{AsymmetricPublicKey, AsymmetricSecretKey};
use pasetors::paserk::{FormatAsPaserk, Id};
use pasetors::token::UntrustedToken;
use pasetors::version4::{PublicToken, V4};
use pasetors::Public;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::account::Role;
use crate::roster::Cohort;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid footer")]
    InvalidFooter,
    #[error("missing footer")]
    MissingFooter,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("invalid key material")]
    InvalidKey,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("invalid issued-at")]
    InvalidIat,
    #[error("invalid expiration")]
    InvalidExp,
    #[error("token expired")]
    Expired,
    #[error("signing failed")]
    Signing,
    #[error("time format error")]
    TimeFormat,
    #[error("time parse error")]
    TimeParse,
}

/// Claims carried by an access token. Profile fields are denormalized for
/// client display so a verified token is enough to render the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub aud: String,
    /// Account id.
    pub sub: String,
    /// Session family the paired refresh token belongs to.
    pub sid: String,
    pub jti: String,
    pub iat: String,
    pub exp: String,
    pub role: Role,
    pub full_name: String,
    pub section_number: u8,
    pub group: Cohort,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenFooter {
    pub kid: String,
}

/// Expected values when verifying an access token.
pub struct VerificationOptions<'a> {
    pub expected_issuer: &'a str,
    pub expected_audience: &'a str,
    pub now: OffsetDateTime,
}

/// Ed25519 keypair for signing and verifying access tokens, with its
/// PASERK ID.
pub struct TokenKeys {
    secret: AsymmetricSecretKey<V4>,
    public: AsymmetricPublicKey<V4>,
    kid: String,
}

impl TokenKeys {
    /// Derive the keypair from a 32-byte Ed25519 seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived key material is rejected.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, TokenError> {
        let signing_key = SigningKey::from_bytes(seed);
        let secret = AsymmetricSecretKey::<V4>::from(&signing_key.to_keypair_bytes())
            .map_err(|_| TokenError::InvalidKey)?;
        let public =
            AsymmetricPublicKey::<V4>::from(signing_key.verifying_key().as_bytes().as_slice())
                .map_err(|_| TokenError::InvalidKey)?;
        let kid = format_kid(&public)?;
        Ok(Self {
            secret,
            public,
            kid,
        })
    }

    /// Generate an ephemeral keypair. Tokens from a previous process die
    /// with it, which is acceptable for single-instance deployments.
    ///
    /// # Errors
    ///
    /// Returns an error if the generated key material is rejected.
    pub fn generate() -> Result<Self, TokenError> {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Parse a base64url-encoded 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoding or length is invalid.
    pub fn from_seed_b64(seed_b64: &str) -> Result<Self, TokenError> {
        let raw = Base64UrlUnpadded::decode_vec(seed_b64).map_err(|_| TokenError::Base64)?;
        let seed: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| TokenError::InvalidKey)?;
        Self::from_seed(&seed)
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

/// Sign an access token with the claims as payload and the kid footer.
///
/// # Errors
///
/// Returns an error if JSON encoding or signing fails.
pub fn sign_access_token(keys: &TokenKeys, claims: &AccessTokenClaims) -> Result<String, TokenError> {
    let payload = serde_json::to_vec(claims)?;
    let footer = serde_json::to_vec(&AccessTokenFooter {
        kid: keys.kid.clone(),
    })?;
    PublicToken::sign(&keys.secret, &payload, Some(&footer), None)
        .map_err(|_| TokenError::Signing)
}

/// Verify an access token and return its decoded claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or carries invalid base64/json,
/// - the footer `kid` does not match the service key,
/// - the signature is invalid,
/// - the claims fail validation (`iss`, `aud`, `iat`, `exp`).
pub fn verify_access_token(
    keys: &TokenKeys,
    token: &str,
    options: &VerificationOptions<'_>,
) -> Result<AccessTokenClaims, TokenError> {
    let untrusted =
        UntrustedToken::<Public, V4>::try_from(token).map_err(|err| map_paseto_error(&err))?;
    let footer_bytes = untrusted.untrusted_footer();
    if footer_bytes.is_empty() {
        return Err(TokenError::MissingFooter);
    }
    let kid = footer_kid(footer_bytes)?;
    if kid != keys.kid {
        return Err(TokenError::UnknownKid(kid));
    }

    let trusted = PublicToken::verify(&keys.public, &untrusted, None, None)
        .map_err(|err| map_paseto_error(&err))?;
    let claims: AccessTokenClaims = serde_json::from_str(trusted.payload())?;
    validate_claims(&claims, options)?;
    Ok(claims)
}

/// Convert a timestamp to the RFC3339 claim representation.
///
/// # Errors
///
/// Returns an error if formatting fails.
pub fn rfc3339(ts: OffsetDateTime) -> Result<String, TokenError> {
    ts.format(&Rfc3339).map_err(|_| TokenError::TimeFormat)
}

/// Parse an RFC3339 claim back into a timestamp.
///
/// # Errors
///
/// Returns an error if parsing fails.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, TokenError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|_| TokenError::TimeParse)
}

fn validate_claims(
    claims: &AccessTokenClaims,
    options: &VerificationOptions<'_>,
) -> Result<(), TokenError> {
    if claims.iss != options.expected_issuer {
        return Err(TokenError::InvalidIssuer);
    }
    if claims.aud != options.expected_audience {
        return Err(TokenError::InvalidAudience);
    }
    let iat = parse_rfc3339(&claims.iat).map_err(|_| TokenError::InvalidIat)?;
    let exp = parse_rfc3339(&claims.exp).map_err(|_| TokenError::InvalidExp)?;
    if iat > options.now {
        return Err(TokenError::InvalidIat);
    }
    if exp <= options.now {
        return Err(TokenError::Expired);
    }
    if exp <= iat {
        return Err(TokenError::InvalidExp);
    }
    Ok(())
}

fn footer_kid(footer_bytes: &[u8]) -> Result<String, TokenError> {
    let mut footer = Footer::new();
    footer
        .parse_bytes(footer_bytes)
        .map_err(|_| TokenError::InvalidFooter)?;
    let kid = footer
        .get_claim("kid")
        .and_then(|value| value.as_str())
        .ok_or(TokenError::InvalidFooter)?;
    Ok(kid.to_string())
}

fn format_kid(key: &AsymmetricPublicKey<V4>) -> Result<String, TokenError> {
    let id = Id::from(key);
    let mut kid = String::new();
    id.fmt(&mut kid).map_err(|_| TokenError::InvalidKey)?;
    Ok(kid)
}

fn map_paseto_error(err: &PasetorsError) -> TokenError {
    match err {
        PasetorsError::Base64 => TokenError::Base64,
        PasetorsError::TokenValidation => TokenError::InvalidSignature,
        PasetorsError::FooterParsing => TokenError::InvalidFooter,
        PasetorsError::Key => TokenError::InvalidKey,
        _ => TokenError::TokenFormat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    const ISSUER: &str = "https://matrikulo.test";
    const AUDIENCE: &str = "matrikulo-portal";

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp")
    }

    fn claims(now: OffsetDateTime) -> Result<AccessTokenClaims, TokenError> {
        Ok(AccessTokenClaims {
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            sub: "9f8b7c0a-0000-4000-8000-000000000001".to_string(),
            sid: "9f8b7c0a-0000-4000-8000-000000000002".to_string(),
            jti: "access-jti".to_string(),
            iat: rfc3339(now)?,
            exp: rfc3339(now + Duration::minutes(30))?,
            role: Role::Student,
            full_name: "Jane Doe".to_string(),
            section_number: 3,
            group: Cohort::GroupOne,
        })
    }

    fn options(now: OffsetDateTime) -> VerificationOptions<'static> {
        VerificationOptions {
            expected_issuer: ISSUER,
            expected_audience: AUDIENCE,
            now,
        }
    }

    #[test]
    fn sign_and_verify_round_trip() -> Result<(), TokenError> {
        let keys = TokenKeys::from_seed(&[7u8; 32])?;
        let token = sign_access_token(&keys, &claims(now())?)?;
        assert!(token.starts_with("v4.public."));

        let verified = verify_access_token(&keys, &token, &options(now()))?;
        assert_eq!(verified.jti, "access-jti");
        assert_eq!(verified.role, Role::Student);
        assert_eq!(verified.section_number, 3);
        Ok(())
    }

    #[test]
    fn verify_rejects_foreign_key() -> Result<(), TokenError> {
        let keys = TokenKeys::from_seed(&[7u8; 32])?;
        let other = TokenKeys::from_seed(&[9u8; 32])?;
        let token = sign_access_token(&other, &claims(now())?)?;

        let result = verify_access_token(&keys, &token, &options(now()));
        assert!(matches!(result, Err(TokenError::UnknownKid(_))));
        Ok(())
    }

    #[test]
    fn verify_rejects_expired_token() -> Result<(), TokenError> {
        let keys = TokenKeys::from_seed(&[7u8; 32])?;
        let token = sign_access_token(&keys, &claims(now())?)?;

        let later = now() + Duration::hours(1);
        let result = verify_access_token(&keys, &token, &options(later));
        assert!(matches!(result, Err(TokenError::Expired)));
        Ok(())
    }

    #[test]
    fn verify_rejects_wrong_audience() -> Result<(), TokenError> {
        let keys = TokenKeys::from_seed(&[7u8; 32])?;
        let token = sign_access_token(&keys, &claims(now())?)?;

        let result = verify_access_token(
            &keys,
            &token,
            &VerificationOptions {
                expected_issuer: ISSUER,
                expected_audience: "someone-else",
                now: now(),
            },
        );
        assert!(matches!(result, Err(TokenError::InvalidAudience)));
        Ok(())
    }

    #[test]
    fn verify_rejects_tampered_token() -> Result<(), TokenError> {
        let keys = TokenKeys::from_seed(&[7u8; 32])?;
        let token = sign_access_token(&keys, &claims(now())?)?;
        let mut tampered = token.into_bytes();
        let at = tampered.len() / 2;
        tampered[at] = if tampered[at] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).expect("utf8");

        let result = verify_access_token(&keys, &tampered, &options(now()));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn seed_b64_round_trip() -> Result<(), TokenError> {
        let seed = [42u8; 32];
        let encoded = Base64UrlUnpadded::encode_string(&seed);
        let keys = TokenKeys::from_seed_b64(&encoded)?;
        assert_eq!(keys.kid(), TokenKeys::from_seed(&seed)?.kid());
        Ok(())
    }
}
