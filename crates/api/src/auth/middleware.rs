//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Header carrying the shared secret configured on the gateway's triggers and actions
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

fn extract_webhook_secret(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
}

/// Constant-time comparison so response timing does not leak the secret
fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Middleware that requires the shared webhook secret
pub async fn require_webhook_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let result = match extract_webhook_secret(&request) {
        Some(provided) if secrets_match(provided, &state.config.webhook_secret) => Ok(()),
        Some(_) => Err(AuthError::InvalidSecret),
        None => Err(AuthError::MissingAuth),
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_webhook_secret: rejected");
            err.into_response()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid webhook secret")]
    InvalidSecret,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidSecret => (StatusCode::UNAUTHORIZED, "Invalid webhook secret"),
            AuthError::InsufficientPermissions => {
                (StatusCode::FORBIDDEN, "Insufficient permissions")
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
