// SPDX-License-Identifier: MIT
//!
//! Crate-wide error taxonomy.
//!
//! Every handler terminates its own response; nothing here is re-thrown
//! across a handler boundary. Internal detail is logged via `tracing` and
//! never placed in a response body — callers only ever see the generic
//! messages below.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing credentials at startup when external access requires them,
    /// or an invalid bind address. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Wrong username/password.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Auth-failure lockout or general token-bucket exhaustion.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Missing or mismatched CSRF tokens.
    #[error("csrf check failed")]
    CsrfFailure,

    /// No valid session for a protected endpoint.
    #[error("authorization missing")]
    AuthorizationMissing { is_api_or_ws: bool, login_path: String },

    /// RNG failure, I/O error on cookie write, or similar.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrong method, malformed JSON, body too large.
    #[error("protocol violation: {0}")]
    Protocol(ProtocolViolation),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("malformed request body")]
    MalformedBody,
    #[error("request body too large")]
    BodyTooLarge,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Configuration(detail) => {
                error!(%detail, "configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"success": false, "error": "configuration error"})),
                )
                    .into_response()
            }
            AppError::AuthenticationFailure => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"success": false, "error": "Invalid username or password"})),
            )
                .into_response(),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(axum::http::header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "success": false,
                    "error": "too many attempts",
                    "retry_after_sec": retry_after_secs,
                })),
            )
                .into_response(),
            AppError::CsrfFailure => (
                StatusCode::FORBIDDEN,
                Json(json!({"success": false, "error": "csrf check failed"})),
            )
                .into_response(),
            AppError::AuthorizationMissing { is_api_or_ws, login_path } => {
                if is_api_or_ws {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"success": false, "error": "authentication required"})),
                    )
                        .into_response()
                } else {
                    // 302 Found, not axum's `Redirect::to` (303 See Other) —
                    // §4.9 step 6 / §8 invariant 2 require response ∈ {401, 302}.
                    let mut resp = StatusCode::FOUND.into_response();
                    resp.headers_mut().insert(
                        axum::http::header::LOCATION,
                        axum::http::HeaderValue::from_str(&login_path)
                            .unwrap_or_else(|_| axum::http::HeaderValue::from_static("/")),
                    );
                    resp
                }
            }
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"success": false, "error": "internal error"})),
                )
                    .into_response()
            }
            AppError::Protocol(violation) => {
                warn!(%violation, "protocol violation");
                let status = match violation {
                    ProtocolViolation::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
                    ProtocolViolation::MalformedBody => StatusCode::BAD_REQUEST,
                    ProtocolViolation::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                };
                (status, Json(json!({"success": false, "error": "bad request"}))).into_response()
            }
        }
    }
}
