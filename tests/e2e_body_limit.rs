// SPDX-License-Identifier: MIT
//! Request body size limit end-to-end: a body under the configured cap is
//! accepted, a body over it is rejected before the handler ever sees it.

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

const LIMIT_BYTES: usize = 16;

fn post_with_body(body: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/api/echo")
        .body(Body::from(body.to_string()))
        .unwrap();
    req.extensions_mut().insert(ConnectInfo("203.0.113.9:1234".parse::<SocketAddr>().unwrap()));
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
    let protected = axum::Router::new().route("/api/echo", post(|| async { "ok" }));
    router::build(state, Arc::new(SecurityConfig::default()), Duration::from_secs(30), LIMIT_BYTES, protected)
}

#[tokio::test]
async fn body_under_the_limit_is_accepted() {
    let app = build_app();
    let resp = app.oneshot(post_with_body("short")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn body_over_the_limit_is_rejected() {
    let app = build_app();
    let oversized = "x".repeat(LIMIT_BYTES * 4);
    let resp = app.oneshot(post_with_body(&oversized)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
