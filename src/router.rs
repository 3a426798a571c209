// SPDX-License-Identifier: MIT
//!
//! Assembles the middleware chain and route table (§2).
//!
//! Order, outermost first (matches the documented data/control flow):
//! hide-server-info → request-size limit → request-timeout (bypass on
//! WebSocket upgrade) → security headers + CSP nonce injection → per-IP
//! token bucket (external only) → CSRF guard (external + state-changing +
//! non-exempt) → auth gate. `axum::Router::layer` makes the *last* call the
//! outermost wrapper, so the calls below run in the reverse of that list.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::credentials::CredentialValidator;
use crate::auth::csrf;
use crate::auth::failure_limiter::FailureLimiter;
use crate::auth::gate::{self, AuthGate, AuthGateConfig};
use crate::auth::session::SessionStore;
use crate::controller::ListenerController;
use crate::http::{compression, security, timeout};
use crate::ratelimit::{self, RateLimiter};
use crate::routes;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialValidator>,
    pub failure_limiter: Arc<FailureLimiter>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub api_prefix: String,
    pub login_page_path: String,
    pub controller: ListenerController,
}

async fn hide_server_info(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    resp.headers_mut().remove(axum::http::header::SERVER);
    resp.headers_mut().remove("x-powered-by");
    resp
}

async fn csrf_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if csrf::request_needs_rejection(&req, &state.api_prefix) {
        return (StatusCode::FORBIDDEN, "CSRF token missing or invalid").into_response();
    }
    next.run(req).await
}

/// Build the full handler graph: public routes (health, login, csrf-token,
/// status) plus whatever protected routes the caller supplies, with the
/// documented middleware chain wrapped around all of it.
pub fn build(
    state: AppState,
    security_config: Arc<security::SecurityConfig>,
    request_timeout: Duration,
    body_limit_bytes: usize,
    protected: Router<AppState>,
) -> Router {
    let api_prefix = state.api_prefix.clone();

    let public = Router::new()
        .route(&format!("{api_prefix}/api/health"), get(routes::health::get))
        .route(&format!("{api_prefix}/api/login"), post(routes::login::post))
        .route(&format!("{api_prefix}/api/logout"), post(routes::logout::post))
        .route(&format!("{api_prefix}/api/csrf-token"), get(routes::csrf_token::get))
        .route(&format!("{api_prefix}/api/external-status"), get(routes::status::get));

    let app = public
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(
            AuthGate {
                credentials: state.credentials.clone(),
                sessions: state.sessions.clone(),
                config: AuthGateConfig {
                    login_page_path: state.login_page_path.clone(),
                    api_prefix: api_prefix.clone(),
                    public_prefixes: vec![
                        format!("{api_prefix}/api/health"),
                        format!("{api_prefix}/api/login"),
                        format!("{api_prefix}/api/logout"),
                        format!("{api_prefix}/api/csrf-token"),
                        format!("{api_prefix}/api/external-status"),
                        "/static".to_string(),
                        state.login_page_path.clone(),
                    ],
                },
            },
            gate::require_session,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), csrf_guard))
        .route_layer(middleware::from_fn_with_state(state.rate_limiter.clone(), ratelimit::enforce))
        .route_layer(middleware::from_fn_with_state(security_config, security::apply))
        .route_layer(middleware::from_fn_with_state(request_timeout, timeout::apply))
        .layer(middleware::from_fn(compression::apply))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::from_fn(hide_server_info))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    app
}
