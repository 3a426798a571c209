// SPDX-License-Identifier: MIT
//!
//! Request timeout, bypassing WebSocket upgrades (§4.12).
//!
//! `tower_http::timeout::TimeoutLayer` would apply uniformly to every
//! request including long-lived WS connections, which is exactly what must
//! NOT happen — a chat session held open for hours would get killed at the
//! configured deadline. This middleware checks the `Upgrade` header itself
//! and only wraps non-upgrade requests in a deadline.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

fn is_websocket_upgrade(req: &Request) -> bool {
    req.headers()
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

pub async fn apply(State(timeout): State<Duration>, req: Request, next: Next) -> Response {
    if is_websocket_upgrade(&req) {
        return next.run(req).await;
    }

    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(resp) => resp,
        Err(_) => StatusCode::REQUEST_TIMEOUT.into_response(),
    }
}
