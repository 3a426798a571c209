// SPDX-License-Identifier: MIT
//! Allow-list bypass end-to-end: a peer inside the configured allow-list
//! skips session authentication entirely; a peer outside it is redirected
//! to the login page.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use tower::ServiceExt;

use session_fabric::auth::clock::TestClock;
use session_fabric::auth::session::SessionConfig;
use session_fabric::auth::{CredentialValidator, Credentials, FailureLimiter, FailureLimiterConfig, SessionStore};
use session_fabric::controller::ListenerController;
use session_fabric::http::security::SecurityConfig;
use session_fabric::ipset::IpSet;
use session_fabric::ratelimit::{RateLimiter, RateLimiterConfig};
use session_fabric::router::{self, AppState};

fn get_protected(peer: &str) -> Request<Body> {
    let mut req = Request::builder().method("GET").uri("/api/protected").body(Body::empty()).unwrap();
    req.extensions_mut().insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
    req.extensions_mut().insert(session_fabric::context::External);
    req
}

fn build_app() -> axum::Router {
    let clock = Arc::new(TestClock::new());
    let allow_list = IpSet::parse(&["127.0.0.1".to_string(), "192.168.1.0/24".to_string()]).unwrap();
    let credentials = Arc::new(CredentialValidator::new(
        Some(Credentials { username: "admin".to_string(), password: "secret".to_string() }),
        allow_list,
    ));
    let state = AppState {
        credentials: credentials.clone(),
        failure_limiter: FailureLimiter::with_clock(FailureLimiterConfig::default(), clock),
        sessions: SessionStore::new(SessionConfig::default()),
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
        api_prefix: String::new(),
        login_page_path: "/login".to_string(),
        controller: ListenerController::new(credentials),
    };
    let protected = axum::Router::new().route("/api/protected", get(|| async { "secret garden" }));
    router::build(state, Arc::new(SecurityConfig::default()), Duration::from_secs(30), 2 * 1024 * 1024, protected)
}

#[tokio::test]
async fn allow_listed_peer_bypasses_session_requirement() {
    let app = build_app();
    let resp = app.oneshot(get_protected("192.168.1.50:5000")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn non_allow_listed_peer_is_redirected_to_login() {
    let app = build_app();
    let resp = app.oneshot(get_protected("8.8.8.8:5000")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(axum::http::header::LOCATION).unwrap(), "/login");
}
