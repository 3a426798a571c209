// SPDX-License-Identifier: MIT
//!
//! `POST {prefix}/api/login` (§4.10).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::session::build_session_cookie;
use crate::context::is_external;
use crate::proxy;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_sec: Option<u64>,
}

fn rate_limited(seconds: u64) -> Response {
    let body = LoginResponse {
        success: false,
        error: Some("Too many attempts. Try again later.".to_string()),
        retry_after_sec: Some(seconds),
    };
    let mut resp = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    resp.headers_mut().insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from_str(&seconds.to_string()).unwrap(),
    );
    resp
}

pub async fn post(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let external = is_external(&req);
    let effective_ip =
        if external { proxy::current().get_client_ip(peer.ip(), req.headers()) } else { peer.ip() };

    // Consult the limiter before even parsing the body (§4.10: "before
    // parsing the body, consult the auth-failure limiter").
    let (blocked, remaining) = state.failure_limiter.is_blocked(effective_ip);
    if blocked {
        return rate_limited(remaining.as_secs().max(1));
    }

    let bytes = match axum::body::to_bytes(req.into_body(), 64 * 1024).await {
        Ok(b) => b,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(LoginResponse { success: false, error: Some("malformed body".to_string()), retry_after_sec: None }),
            )
                .into_response()
        }
    };
    let parsed: Result<LoginRequest, _> = serde_json::from_slice(&bytes);
    let Ok(body) = parsed else {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse { success: false, error: Some("malformed JSON".to_string()), retry_after_sec: None }),
        )
            .into_response();
    };

    if body.username.is_empty() || body.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse { success: false, error: Some("username and password are required".to_string()), retry_after_sec: None }),
        )
            .into_response();
    }

    if !state.credentials.validate(&body.username, &body.password) {
        let (now_blocked, lockout) = state.failure_limiter.record_failure(effective_ip);
        if now_blocked {
            warn!(%effective_ip, "login locked out after repeated failures");
            return rate_limited(lockout.as_secs().max(1));
        }
        warn!(%effective_ip, "login failed");
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                success: false,
                error: Some("Invalid username or password".to_string()),
                retry_after_sec: None,
            }),
        )
            .into_response();
    }

    state.failure_limiter.record_success(effective_ip);
    let record = state.sessions.create_session(&body.username);
    let cookie = build_session_cookie(&record);

    let mut resp =
        (StatusCode::OK, Json(LoginResponse { success: true, error: None, retry_after_sec: None }))
            .into_response();
    resp.headers_mut().insert(axum::http::header::SET_COOKIE, HeaderValue::from_str(&cookie).unwrap());
    resp
}
