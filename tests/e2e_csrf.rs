// SPDX-License-Identifier: MIT
//! CSRF double-submit end-to-end: an external, state-changing request to a
//! non-exempt path is rejected unless it carries a matching cookie+header
//! pair; a matching pair is let through to the protected handler.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use tower::ServiceExt;

use session_fabric::auth::clock::TestClock;
use session_fabric::auth::session::SessionConfig;
use session_fabric::auth::{CredentialValidator, FailureLimiter, FailureLimiterConfig, SessionStore};
use session_fabric::controller::ListenerController;
use session_fabric::http::security::SecurityConfig;
use session_fabric::ipset::IpSet;
use session_fabric::ratelimit::{RateLimiter, RateLimiterConfig};
use session_fabric::router::{self, AppState};

fn post_protected(cookie: Option<&str>, header: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/protected");
    if let Some(c) = cookie {
        builder = builder.header(axum::http::header::COOKIE, format!("app_csrf={c}"));
    }
    if let Some(h) = header {
        builder = builder.header("x-csrf-token", h);
    }
    let mut req = builder.body(Body::empty()).unwrap();
    req.extensions_mut().insert(ConnectInfo("203.0.113.9:1234".parse::<SocketAddr>().unwrap()));
    req.extensions_mut().insert(session_fabric::context::External);
    req
}

fn build_app() -> axum::Router {
    let clock = Arc::new(TestClock::new());
    let credentials = Arc::new(CredentialValidator::new(None, IpSet::default()));
    let state = AppState {
        credentials: credentials.clone(),
        failure_limiter: FailureLimiter::with_clock(FailureLimiterConfig::default(), clock),
        sessions: SessionStore::new(SessionConfig::default()),
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
        api_prefix: String::new(),
        login_page_path: "/login".to_string(),
        controller: ListenerController::new(credentials),
    };
    let protected = axum::Router::new().route("/api/protected", post(|| async { "done" }));
    router::build(state, Arc::new(SecurityConfig::default()), Duration::from_secs(30), 2 * 1024 * 1024, protected)
}

#[tokio::test]
async fn missing_tokens_are_rejected() {
    let app = build_app();
    let resp = app.oneshot(post_protected(None, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn header_without_cookie_is_rejected() {
    let app = build_app();
    let resp = app.oneshot(post_protected(None, Some("abc123"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn mismatched_tokens_are_rejected() {
    let app = build_app();
    let resp = app.oneshot(post_protected(Some("abc123"), Some("xyz789"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn matching_tokens_are_let_through() {
    let app = build_app();
    let resp = app.oneshot(post_protected(Some("abc123"), Some("abc123"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
