// SPDX-License-Identifier: MIT
//!
//! Stateless double-submit CSRF guard (§4.8).
//!
//! No server-side token store: the cookie and the header both carry the
//! same opaque value, and the browser's same-origin policy is what keeps a
//! cross-site attacker from reading the cookie to forge a matching header.
//! The guard only compares what it's handed — constant-time, so a
//! byte-by-byte timing oracle can't shortcut the forgery.

use axum::http::{HeaderMap, Method};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::context::is_external;

pub const COOKIE_NAME: &str = "app_csrf";
pub const HEADER_NAME: &str = "x-csrf-token";

/// Paths exempt from the CSRF check regardless of method — the login
/// endpoint pre-dates session establishment and has its own rate limiting.
pub fn is_exempt_path(path: &str, api_prefix: &str) -> bool {
    path == format!("{api_prefix}/api/login")
}

fn is_state_changing(method: &Method) -> bool {
    matches!(method, &Method::POST | &Method::PUT | &Method::PATCH | &Method::DELETE)
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let part = part.trim();
        let (k, v) = part.split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Whether this request must pass the CSRF check at all (§4.8's applies-only
/// clause). Call this before [`check`] — `check` assumes the request is
/// in-scope and will reject anything that doesn't carry matching tokens.
pub fn applies_to(method: &Method, path: &str, api_prefix: &str, headers: &HeaderMap, external: bool) -> bool {
    external
        && is_state_changing(method)
        && !is_exempt_path(path, api_prefix)
        && !is_websocket_upgrade(headers)
}

/// `true` iff the request carries a non-empty, equal cookie+header pair.
pub fn check(headers: &HeaderMap) -> bool {
    let header_value = match headers.get(HEADER_NAME).and_then(|v| v.to_str().ok()) {
        Some(v) if !v.is_empty() => v,
        _ => return false,
    };
    let cookie_value = match cookie_value(headers, COOKIE_NAME) {
        Some(v) if !v.is_empty() => v,
        _ => return false,
    };
    bool::from(header_value.as_bytes().ct_eq(cookie_value.as_bytes()))
}

/// Middleware entry point combining scope + check, using the request's
/// `external` marker (set only by the external listener, never faked on the
/// internal path — see `context::mark_external`).
pub fn request_needs_rejection(req: &axum::extract::Request, api_prefix: &str) -> bool {
    let external = is_external(req);
    let applies = applies_to(req.method(), req.uri().path(), api_prefix, req.headers(), external);
    applies && !check(req.headers())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issue a fresh token and the `Set-Cookie` value for `GET {prefix}/api/csrf-token`.
pub fn issue() -> (String, String) {
    let token = generate_token();
    let set_cookie = format!(
        "{COOKIE_NAME}={token}; Secure; SameSite=Lax; Path=/; Max-Age=604800"
    );
    (token, set_cookie)
}
