// SPDX-License-Identifier: MIT
//!
//! The `external` request-context marker.
//!
//! This is the single source of truth for "untrusted traffic": the CSRF
//! guard, the general rate limiter, and response-compression opt-in all key
//! on its presence. A request that reaches a handler without this marker
//! arrived through the loopback-only listener and is treated as already
//! trusted (§4.9 step 2's rationale).

use axum::{extract::Request, middleware::Next, response::Response};

/// Marker inserted into request extensions by the external listener's
/// wrapping middleware. Absence means "internal".
#[derive(Debug, Clone, Copy)]
pub struct External;

/// Installed by the external listener in front of the shared handler graph.
/// This is the *only* place `External` is ever inserted — callers must
/// never construct it on the internal listener's path.
pub async fn mark_external(mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(External);
    next.run(req).await
}

/// True iff the request context carries the `external` marker.
pub fn is_external(req: &Request) -> bool {
    req.extensions().get::<External>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest};

    #[test]
    fn request_without_marker_is_internal() {
        let req = HttpRequest::builder().body(Body::empty()).unwrap();
        assert!(!is_external(&req));
    }

    #[test]
    fn request_with_marker_is_external() {
        let mut req = HttpRequest::builder().body(Body::empty()).unwrap();
        req.extensions_mut().insert(External);
        assert!(is_external(&req));
    }
}
