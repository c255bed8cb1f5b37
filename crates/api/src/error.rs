//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scholarsync_billing::BillingError;
use serde_json::json;

use crate::auth::AuthError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Action error body understood by the gateway: `{message, extensions: {code}}`
fn action_error(status: StatusCode, message: String, code: &str) -> Response {
    let body = Json(json!({
        "message": message,
        "extensions": { "code": code }
    }));
    (status, body).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) => err.into_response(),
            ApiError::Billing(err) if err.is_client_error() => {
                action_error(StatusCode::BAD_REQUEST, err.to_string(), err.code())
            }
            ApiError::Billing(err) => {
                tracing::error!(error = %err, code = err.code(), "Upstream failure");
                action_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    err.code(),
                )
            }
            ApiError::InvalidPayload(detail) => {
                tracing::warn!(detail = %detail, "Rejected malformed payload");
                action_error(
                    StatusCode::BAD_REQUEST,
                    format!("invalid payload: {}", detail),
                    "invalid_payload",
                )
            }
        }
    }
}
