//! Registration begin/confirm endpoints.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::types::{
    ConfirmRequest, ConfirmResponse, RegisterRequest, RegisterResponse, WeakPasswordResponse,
};
use crate::registration::RegistrationError;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "Pending registration created, code sent", body = RegisterResponse),
        (status = 400, description = "Weak password or invalid field", body = WeakPasswordResponse),
        (status = 404, description = "Unknown verification id", body = String),
        (status = 409, description = "Already registered or duplicate username/email", body = String),
        (status = 503, description = "Code delivery unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match auth_state
        .registrar()
        .begin_registration(
            request.verification_id,
            &request.username,
            &request.email,
            &request.password,
        )
        .await
    {
        Ok(pending_id) => (StatusCode::ACCEPTED, Json(RegisterResponse { pending_id }))
            .into_response(),
        Err(err) => registration_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/register/confirm",
    request_body = ConfirmRequest,
    responses(
        (status = 201, description = "Account created", body = ConfirmResponse),
        (status = 400, description = "Invalid code", body = String),
        (status = 409, description = "Roster entry already registered", body = String),
        (status = 410, description = "Code or pending registration expired", body = String),
        (status = 503, description = "Code gate unavailable", body = String)
    ),
    tag = "auth"
)]
pub async fn confirm(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ConfirmRequest>>,
) -> impl IntoResponse {
    let request: ConfirmRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match auth_state
        .registrar()
        .confirm_registration(request.pending_id, &request.code)
    {
        Ok(account_id) => (StatusCode::CREATED, Json(ConfirmResponse { account_id }))
            .into_response(),
        Err(err) => registration_error_response(&err),
    }
}

fn registration_error_response(err: &RegistrationError) -> axum::response::Response {
    match err {
        RegistrationError::NoMatch { .. } => (
            StatusCode::NOT_FOUND,
            "Unknown verification id".to_string(),
        )
            .into_response(),
        RegistrationError::AlreadyRegistered => (
            StatusCode::CONFLICT,
            "Roster entry is already registered".to_string(),
        )
            .into_response(),
        RegistrationError::WeakPassword(violations) => (
            StatusCode::BAD_REQUEST,
            Json(WeakPasswordResponse {
                error: "Password violates the strength policy".to_string(),
                violations: violations.clone(),
            }),
        )
            .into_response(),
        RegistrationError::InvalidUsername => {
            (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response()
        }
        RegistrationError::InvalidEmail => {
            (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response()
        }
        RegistrationError::DuplicateIdentity => (
            StatusCode::CONFLICT,
            "Username or email already in use".to_string(),
        )
            .into_response(),
        RegistrationError::CodeExpired => (
            StatusCode::GONE,
            "Code expired, restart registration".to_string(),
        )
            .into_response(),
        RegistrationError::CodeInvalid => {
            (StatusCode::BAD_REQUEST, "Invalid code".to_string()).into_response()
        }
        RegistrationError::Transient(inner) => {
            error!("Registration dependency unavailable: {inner}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Temporarily unavailable, try again".to_string(),
            )
                .into_response()
        }
    }
}
