//! Login and session refresh endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use super::state::AuthState;
use super::types::{LoginRequest, RefreshRequest, TokenResponse};
use super::utils::extract_client_ip;
use crate::account::Account;
use crate::credential;
use crate::rate_limit::retry_estimate;
use crate::token::paseto::rfc3339;
use crate::token::{ProfileClaims, RefreshError, TokenPair};

/// Fixed message for every credential failure; never says which half of the
/// pair was wrong or whether the account exists.
const GENERIC_LOGIN_ERROR: &str = "Incorrect username or password";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let identifier = request.username.trim().to_lowercase();
    if identifier.is_empty() || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing credentials".to_string()).into_response();
    }

    // The limiter is keyed by the client, not the submitted username, so a
    // spray across many usernames still exhausts one budget and a third
    // party cannot lock a victim's username. Requests with no proxy headers
    // share one bucket. The attempt counts whether or not the credentials
    // hold.
    let client = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    let decision = auth_state.rate_limiter().check(&client);
    if !decision.allowed {
        warn!(%client, "login rate limited");
        let now = OffsetDateTime::now_utc();
        let estimate = decision
            .reset_at
            .map_or_else(|| "a moment".to_string(), |reset| retry_estimate(reset, now));
        return (
            StatusCode::TOO_MANY_REQUESTS,
            format!("Too many attempts. Try again in {estimate}"),
        )
            .into_response();
    }

    let started = Instant::now();
    let account = match auth_state
        .registrar()
        .accounts()
        .find_by_username(&identifier)
        .filter(|account| account.is_active)
    {
        Some(account) => {
            let password = request.password.clone();
            let password_hash = account.password_hash.clone();
            let verified = match tokio::task::spawn_blocking(move || {
                credential::verify_password(&password, &password_hash)
            })
            .await
            {
                Ok(verified) => verified,
                Err(err) => {
                    error!("Password verification task failed: {err}");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Login failed".to_string(),
                    )
                        .into_response();
                }
            };
            verified.then_some(account)
        }
        // Unknown username burns the same response floor as a bad password.
        None => None,
    };

    let Some(account) = account else {
        enforce_delay_floor(&auth_state, started).await;
        return (StatusCode::UNAUTHORIZED, GENERIC_LOGIN_ERROR.to_string()).into_response();
    };
    let now = OffsetDateTime::now_utc();
    auth_state.registrar().accounts().record_login(account.id, now);

    let pair = match auth_state.tokens().issue(
        account.id,
        ProfileClaims {
            full_name: account.full_name.clone(),
            section_number: account.section_number,
            group: account.group,
            role: account.role,
        },
    ) {
        Ok(pair) => pair,
        Err(err) => {
            error!("Token issuance failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    debug!(account_id = %account.id, session_id = %pair.session_id, "login successful");
    token_response(&account, pair)
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session refreshed, tokens rotated", body = TokenResponse),
        (status = 401, description = "Invalid, expired, or revoked refresh token", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match auth_state.tokens().refresh(&request.refresh_token) {
        Ok(pair) => {
            let account = auth_state
                .registrar()
                .accounts()
                .get(session_owner(&auth_state, pair.session_id));
            match account {
                Some(account) if account.is_active => token_response(&account, pair),
                // Account removed or deactivated after the session started.
                _ => {
                    auth_state.tokens().revoke(pair.session_id);
                    (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
                        .into_response()
                }
            }
        }
        Err(RefreshError::Internal(err)) => {
            error!("Token rotation failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Refresh failed".to_string(),
            )
                .into_response()
        }
        // Invalid, expired, reused, and revoked all collapse to one answer.
        Err(err) => {
            debug!("Refresh rejected: {err}");
            (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string()).into_response()
        }
    }
}

fn session_owner(auth_state: &AuthState, session_id: uuid::Uuid) -> uuid::Uuid {
    auth_state
        .tokens()
        .session_user(session_id)
        .unwrap_or_else(uuid::Uuid::nil)
}

async fn enforce_delay_floor(auth_state: &AuthState, started: Instant) {
    let floor = auth_state.config().min_login_delay();
    let elapsed = started.elapsed();
    if elapsed < floor {
        tokio::time::sleep(floor - elapsed).await;
    }
}

fn token_response(account: &Account, pair: TokenPair) -> axum::response::Response {
    let (Ok(issued_at), Ok(expires_at)) = (rfc3339(pair.issued_at), rfc3339(pair.expires_at))
    else {
        error!(account_id = %account.id, "Failed to format token timestamps");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Login failed".to_string(),
        )
            .into_response();
    };

    (
        StatusCode::OK,
        Json(TokenResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            session_id: pair.session_id,
            issued_at,
            expires_at,
        }),
    )
        .into_response()
}
