//! Admin unwind endpoints.
//!
//! Unlike the student-facing auth surface, every failure here is verbose:
//! admins need to know exactly what went wrong.

use axum::{
    extract::{Extension, Path},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use super::state::AuthState;
use crate::registration::AdminDeleteError;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterResponse {
    pub ok: bool,
    pub removed_accounts: usize,
    pub roster_record_found: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BulkResetFailure {
    pub id: Uuid,
    pub reason: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BulkResetResponse {
    pub succeeded: usize,
    pub failed: Vec<BulkResetFailure>,
}

/// Static bearer check for the admin surface. No configured token means the
/// surface is disabled entirely.
fn require_admin(headers: &HeaderMap, auth_state: &AuthState) -> Result<(), (StatusCode, String)> {
    let Some(expected) = auth_state.config().admin_token() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Admin interface not configured".to_string(),
        ));
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        Some(_) => {
            warn!("Admin request with wrong token");
            Err((StatusCode::UNAUTHORIZED, "Invalid admin token".to_string()))
        }
        None => Err((
            StatusCode::UNAUTHORIZED,
            "Missing admin bearer token".to_string(),
        )),
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/roster/{id}/unregister",
    params(("id" = Uuid, Path, description = "Roster record id")),
    responses(
        (status = 200, description = "Record unregistered (idempotent)", body = UnregisterResponse),
        (status = 401, description = "Missing or invalid admin token", body = String),
        (status = 503, description = "Admin interface not configured", body = String)
    ),
    tag = "admin"
)]
pub async fn unregister(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err((status, message)) = require_admin(&headers, &auth_state) {
        return (status, message).into_response();
    }

    let outcome = auth_state.registrar().unregister(id);
    (
        StatusCode::OK,
        Json(UnregisterResponse {
            ok: true,
            removed_accounts: outcome.removed_accounts,
            roster_record_found: outcome.roster_record_found,
        }),
    )
        .into_response()
}

#[utoipa::path(
    delete,
    path = "/v1/admin/accounts/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account deleted and roster record reset"),
        (status = 401, description = "Missing or invalid admin token", body = String),
        (status = 404, description = "Account not found", body = String),
        (status = 503, description = "Admin interface not configured", body = String)
    ),
    tag = "admin"
)]
pub async fn delete_account(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err((status, message)) = require_admin(&headers, &auth_state) {
        return (status, message).into_response();
    }

    match auth_state.registrar().delete_account(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(AdminDeleteError::AccountNotFound) => {
            (StatusCode::NOT_FOUND, format!("No account with id {id}")).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/reset",
    responses(
        (status = 200, description = "Per-record reset report", body = BulkResetResponse),
        (status = 401, description = "Missing or invalid admin token", body = String),
        (status = 503, description = "Admin interface not configured", body = String)
    ),
    tag = "admin"
)]
pub async fn bulk_reset(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Err((status, message)) = require_admin(&headers, &auth_state) {
        return (status, message).into_response();
    }

    let report = auth_state.registrar().bulk_reset();
    (
        StatusCode::OK,
        Json(BulkResetResponse {
            succeeded: report.succeeded,
            failed: report
                .failed
                .into_iter()
                .map(|failure| BulkResetFailure {
                    id: failure.id,
                    reason: failure.reason,
                })
                .collect(),
        }),
    )
        .into_response()
}
