use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::error;

use super::types::VerifyCodeRequest;
use super::utils::{normalize_email, valid_email};
use super::GENERIC_REJECTION;
use crate::otp::models::CodeValidation;
use crate::otp::service::ResetService;

/// Verify a submitted reset code, consuming it on the first match.
#[utoipa::path(
    post,
    path = "/v1/reset/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 204, description = "Code verified and consumed"),
        (status = 400, description = "Invalid/expired code or malformed payload", body = String),
        (status = 500, description = "Store unavailable", body = String)
    ),
    tag = "reset"
)]
pub async fn verify_code(
    service: Extension<Arc<ResetService>>,
    payload: Option<Json<VerifyCodeRequest>>,
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

    match service.verify_code(&email, code).await {
        Ok(CodeValidation::Valid) => StatusCode::NO_CONTENT.into_response(),
        // One message for mismatched, expired, and missing codes; callers
        // cannot probe which case they hit.
        Ok(_) => (StatusCode::BAD_REQUEST, GENERIC_REJECTION.to_string()).into_response(),
        Err(err) => {
            error!("failed to verify reset code: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response()
        }
    }
}
