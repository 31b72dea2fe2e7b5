//! Roster identity verification endpoint.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::debug;

use super::state::AuthState;
use super::types::{VerifyRequest, VerifyResponse};

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Match outcome with ranked suggestions", body = VerifyResponse),
        (status = 400, description = "Validation error", body = String)
    ),
    tag = "auth"
)]
pub async fn verify(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyRequest>>,
) -> impl IntoResponse {
    let request: VerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.full_name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing full name".to_string()).into_response();
    }

    let outcome = auth_state.registrar().verify_identity(
        &request.full_name,
        request.section_number,
        request.group,
    );

    debug!(
        valid = outcome.is_valid(),
        suggestions = outcome.suggestions.len(),
        "identity verification"
    );

    let response = match outcome.matched {
        Some(record) => VerifyResponse {
            valid: true,
            verification_id: Some(record.id),
            full_name: Some(record.full_name),
            section_number: Some(record.section_number),
            group: Some(record.group),
            registered: Some(record.is_registered),
            suggestions: Vec::new(),
        },
        None => VerifyResponse {
            valid: false,
            verification_id: None,
            full_name: None,
            section_number: None,
            group: None,
            registered: None,
            suggestions: outcome.suggestions,
        },
    };

    (StatusCode::OK, Json(response)).into_response()
}
