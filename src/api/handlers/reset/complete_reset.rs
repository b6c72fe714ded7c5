use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::error;

use super::types::{CompleteResetRequest, MessageResponse};
use super::utils::{normalize_email, valid_email, valid_new_password, MIN_PASSWORD_LENGTH};
use super::GENERIC_REJECTION;
use crate::otp::service::{ResetOutcome, ResetService};

/// Set a new password, re-submitting the address and verified code as proof.
#[utoipa::path(
    post,
    path = "/v1/reset/complete",
    request_body = CompleteResetRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Unverified/expired pairing or malformed payload", body = String),
        (status = 502, description = "Credential backend failed; retry without re-verifying", body = String),
        (status = 500, description = "Store unavailable", body = String)
    ),
    tag = "reset"
)]
pub async fn complete_reset(
    service: Extension<Arc<ResetService>>,
    payload: Option<Json<CompleteResetRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email address".to_string()).into_response();
    }
    let code = request.code.trim();
    if code.is_empty() {
        return (StatusCode::BAD_REQUEST, GENERIC_REJECTION.to_string()).into_response();
    }
    if !valid_new_password(&request.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters long"),
        )
            .into_response();
    }

    match service
        .complete_reset(&email, code, &request.new_password)
        .await
    {
        Ok(ResetOutcome::Completed) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password updated".to_string(),
            }),
        )
            .into_response(),
        Ok(ResetOutcome::NotVerified) => {
            (StatusCode::BAD_REQUEST, GENERIC_REJECTION.to_string()).into_response()
        }
        Ok(ResetOutcome::CredentialUpdateFailed) => (
            StatusCode::BAD_GATEWAY,
            "Could not update the password; please try again".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("failed to complete reset: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Reset failed".to_string(),
            )
                .into_response()
        }
    }
}
