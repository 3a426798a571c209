// SPDX-License-Identifier: MIT
//!
//! Opt-in gzip for external responses (§4.12).
//!
//! Unlike `tower_http`'s `CompressionLayer`, which compresses anything the
//! client will accept, this only fires for traffic marked external, only
//! above a minimum body size (compressing a 40-byte JSON error is pure
//! overhead), and only for content types on an explicit allow-list.
//! WebSocket upgrades are never touched — their body is empty and their
//! connection is about to be hijacked for the protocol switch.

use std::io::Write;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::context::is_external;

const MIN_COMPRESSIBLE_BYTES: usize = 1024;

const COMPRESSIBLE_TYPES: &[&str] =
    &["text/html", "text/css", "text/plain", "application/json", "application/javascript"];

fn is_websocket_upgrade(req: &Request) -> bool {
    req.headers()
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn accepts_gzip(req: &Request) -> bool {
    req.headers()
        .get(axum::http::header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false)
}

fn is_compressible_type(resp: &Response) -> bool {
    resp.headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| COMPRESSIBLE_TYPES.iter().any(|allowed| ct.starts_with(allowed)))
        .unwrap_or(false)
}

pub async fn apply(req: Request, next: Next) -> Response {
    let external = is_external(&req);
    let ws = is_websocket_upgrade(&req);
    let gzip_ok = accepts_gzip(&req);
    let resp = next.run(req).await;

    if !external || ws || !gzip_ok || resp.headers().get(axum::http::header::CONTENT_ENCODING).is_some() {
        return resp;
    }
    if !is_compressible_type(&resp) {
        return resp;
    }

    let (mut parts, body) = resp.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        return Response::from_parts(parts, Body::empty());
    };
    if bytes.len() < MIN_COMPRESSIBLE_BYTES {
        return Response::from_parts(parts, Body::from(bytes));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(&bytes).is_err() {
        return Response::from_parts(parts, Body::from(bytes));
    }
    let Ok(compressed) = encoder.finish() else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    parts.headers.insert(axum::http::header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    parts.headers.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&compressed.len().to_string()).unwrap(),
    );
    Response::from_parts(parts, Body::from(compressed))
}
