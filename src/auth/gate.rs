// SPDX-License-Identifier: MIT
//!
//! Composed auth gate (§4.9).
//!
//! Ordered decision, evaluated once per request on the shared handler
//! graph: disabled auth, loopback effective IP, allow-list membership,
//! public path, valid session cookie all forward unconditionally; anything
//! else gets a 401 (API/WS) or a 302 to the login page (HTML).

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::credentials::CredentialValidator;
use super::session::{SessionStore, COOKIE_NAME as SESSION_COOKIE_NAME};
use crate::context::is_external;
use crate::proxy;

#[derive(Clone)]
pub struct AuthGateConfig {
    pub login_page_path: String,
    pub api_prefix: String,
    /// Path prefixes that forward without a session (§9 Design Notes: pick
    /// prefix-aware matching and apply it uniformly).
    pub public_prefixes: Vec<String>,
}

#[derive(Clone)]
pub struct AuthGate {
    pub credentials: Arc<CredentialValidator>,
    pub sessions: Arc<SessionStore>,
    pub config: AuthGateConfig,
}

fn is_public_path(path: &str, config: &AuthGateConfig) -> bool {
    config.public_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn session_token_from_cookies(req: &Request) -> Option<String> {
    let raw = req.headers().get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let part = part.trim();
        let (k, v) = part.split_once('=')?;
        (k == SESSION_COOKIE_NAME).then(|| v.to_string())
    })
}

fn wants_json_error(path: &str, api_prefix: &str) -> bool {
    path.starts_with(&format!("{api_prefix}/api/")) || path.ends_with("/ws") || path == "/ws"
}

/// A 302 Found to the login page. `axum::response::Redirect::to` issues a
/// 303 See Other instead, which is the wrong status for §4.9 step 6 and
/// §8 invariant 2 (response ∈ {401, 302}), so this builds the response by
/// hand.
fn redirect_to_login(login_page_path: &str) -> Response {
    let mut resp = StatusCode::FOUND.into_response();
    resp.headers_mut()
        .insert(axum::http::header::LOCATION, HeaderValue::from_str(login_page_path).unwrap());
    resp
}

fn unauthorized_response(req: &Request, config: &AuthGateConfig) -> Response {
    let path = req.uri().path();
    if wants_json_error(path, &config.api_prefix) {
        StatusCode::UNAUTHORIZED.into_response()
    } else {
        redirect_to_login(&config.login_page_path)
    }
}

pub async fn require_session(
    State(gate): State<AuthGate>,
    ConnectInfo(peer): ConnectInfo<std::net::SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Auth not enabled: forward unconditionally.
    if !gate.credentials.is_enabled() {
        return next.run(req).await;
    }

    let external = is_external(&req);
    let evaluator = proxy::current();
    let effective_ip: IpAddr =
        if external { evaluator.get_client_ip(peer.ip(), req.headers()) } else { peer.ip() };

    // 2. Loopback effective IP: forward. Per §4.9 rationale, this exemption
    // is meaningful only on the internal path — the external listener is
    // never treated as trusted merely because the peer happens to be
    // 127.0.0.1, since `external` already marks it as untrusted traffic
    // upstream of this check.
    if !external && crate::proxy::is_loopback_ip(effective_ip) {
        return next.run(req).await;
    }

    // 3. Allow-list membership: forward.
    if gate.credentials.is_ip_allowed(effective_ip) {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();

    // 4. Public path: forward.
    if is_public_path(&path, &gate.config) {
        return next.run(req).await;
    }

    // 5. Valid session cookie: forward, attaching the record so downstream
    // handlers (e.g. logout) can read the principal without re-parsing.
    if let Some(token) = session_token_from_cookies(&req) {
        if let Some(record) = gate.sessions.validate_session(&token) {
            req.extensions_mut().insert(record);
            return next.run(req).await;
        }
    }

    // 6. Reject.
    debug!(%path, %effective_ip, "auth gate rejected request");
    unauthorized_response(&req, &gate.config)
}
