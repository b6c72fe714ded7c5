use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::error;

use super::types::{MessageResponse, RequestCodeRequest};
use super::utils::{normalize_email, valid_email};
use crate::otp::service::{CodeIssued, ResetService};

/// Issue a reset code for the address and queue it for delivery.
#[utoipa::path(
    post,
    path = "/v1/reset/request",
    request_body = RequestCodeRequest,
    responses(
        (status = 202, description = "Code issued and handed to delivery", body = MessageResponse),
        (status = 400, description = "Malformed payload or email address", body = String),
        (status = 502, description = "Code issued but delivery failed", body = String),
        (status = 500, description = "Store unavailable", body = String)
    ),
    tag = "reset"
)]
pub async fn request_code(
    service: Extension<Arc<ResetService>>,
    payload: Option<Json<RequestCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email address".to_string()).into_response();
    }

    match service.request_code(&email).await {
        Ok(CodeIssued::Sent) => (
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: "A reset code is on its way".to_string(),
            }),
        )
            .into_response(),
        Ok(CodeIssued::DeliveryFailed) => (
            StatusCode::BAD_GATEWAY,
            "Could not deliver the reset code; request a new one".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("failed to issue reset code: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Reset request failed".to_string(),
            )
                .into_response()
        }
    }
}
