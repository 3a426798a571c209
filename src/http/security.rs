// SPDX-License-Identifier: MIT
//!
//! Security headers, CSP nonce injection, and placeholder substitution (§4.12).
//!
//! | Header                       | Value                                        |
//! |-------------------------------|-----------------------------------------------|
//! | `Strict-Transport-Security`   | `max-age=<configured>; includeSubDomains` (opt-in) |
//! | `X-Content-Type-Options`      | `nosniff`                                     |
//! | `X-Frame-Options`             | `DENY`                                        |
//! | `Referrer-Policy`             | `strict-origin-when-cross-origin`             |
//! | `Permissions-Policy`          | camera/mic/geolocation disabled                |
//! | `Content-Security-Policy`     | `script-src` carries a per-response nonce      |
//! | `Cross-Origin-Opener-Policy`  | `same-origin`                                  |
//! | `Cross-Origin-Resource-Policy`| `same-origin`                                  |
//!
//! HTML responses get the nonce substituted into every `{{CSP_NONCE}}`
//! placeholder in the body (the same nonce the CSP header advertises) and
//! the `{{API_PREFIX}}` placeholder replaced with the configured API
//! prefix; `Content-Length` is recomputed afterward since the substitution
//! changes body length. `Server` and `X-Powered-By` are stripped outright.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use rand::RngCore;

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub enable_hsts: bool,
    pub hsts_max_age: u64,
    pub api_prefix: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { enable_hsts: false, hsts_max_age: 31_536_000, api_prefix: String::new() }
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn is_html_response(resp: &Response) -> bool {
    resp.headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false)
}

pub async fn apply(State(config): State<Arc<SecurityConfig>>, req: Request, next: Next) -> Response {
    let nonce = generate_nonce();
    let mut resp = next.run(req).await;

    let csp = format!(
        "default-src 'self'; \
         script-src 'self' 'nonce-{nonce}'; \
         style-src 'self' 'unsafe-inline'; \
         img-src 'self' data:; \
         connect-src 'self' wss: ws:; \
         frame-ancestors 'none'; \
         base-uri 'none'; \
         object-src 'none'"
    );

    if is_html_response(&resp) {
        resp = substitute_placeholders(resp, &nonce, &config.api_prefix).await;
    }

    let headers = resp.headers_mut();
    if config.enable_hsts {
        let value = format!("max-age={}; includeSubDomains", config.hsts_max_age);
        headers.insert(
            axum::http::header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_str(&value).unwrap(),
        );
    }
    headers.insert(axum::http::header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(axum::http::header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        axum::http::header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert(
        axum::http::header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_str(&csp).unwrap(),
    );
    headers.insert("cross-origin-opener-policy", HeaderValue::from_static("same-origin"));
    headers.insert("cross-origin-resource-policy", HeaderValue::from_static("same-origin"));
    headers.remove(axum::http::header::SERVER);
    headers.remove("x-powered-by");

    resp
}

async fn substitute_placeholders(resp: Response, nonce: &str, api_prefix: &str) -> Response {
    let (mut parts, body) = resp.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(_) => {
            parts.status = StatusCode::INTERNAL_SERVER_ERROR;
            return Response::from_parts(parts, Body::empty());
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    let substituted = text.replace("{{CSP_NONCE}}", nonce).replace("{{API_PREFIX}}", api_prefix);
    parts.headers.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&substituted.len().to_string()).unwrap(),
    );
    Response::from_parts(parts, Body::from(substituted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn html_router(config: SecurityConfig) -> Router {
        Router::new()
            .route(
                "/page",
                get(|| async {
                    Response::builder()
                        .header(axum::http::header::CONTENT_TYPE, "text/html")
                        .body(Body::from(
                            "<script nonce=\"{{CSP_NONCE}}\"></script><a href=\"{{API_PREFIX}}/api/x\">x</a>",
                        ))
                        .unwrap()
                }),
            )
            .route_layer(axum::middleware::from_fn_with_state(Arc::new(config), apply))
    }

    #[tokio::test]
    async fn nonce_in_csp_matches_nonce_in_body() {
        let app = html_router(SecurityConfig::default());
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/page").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let csp = resp
            .headers()
            .get(axum::http::header::CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let nonce_start = csp.find("'nonce-").unwrap() + "'nonce-".len();
        let nonce_end = csp[nonce_start..].find('\'').unwrap() + nonce_start;
        let nonce = &csp[nonce_start..nonce_end];

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body_text = String::from_utf8(body.to_vec()).unwrap();
        assert!(body_text.contains(&format!("nonce=\"{nonce}\"")));
    }

    #[tokio::test]
    async fn api_prefix_is_substituted_and_content_length_matches() {
        let app = html_router(SecurityConfig { api_prefix: "/v1".to_string(), ..SecurityConfig::default() });
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/page").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let content_length: usize = resp
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), content_length);
        assert!(String::from_utf8_lossy(&body).contains("/v1/api/x"));
    }

    #[tokio::test]
    async fn server_and_powered_by_headers_are_stripped() {
        let router = Router::new()
            .route(
                "/x",
                get(|| async {
                    Response::builder()
                        .header(axum::http::header::SERVER, "nginx")
                        .header("x-powered-by", "php")
                        .body(Body::empty())
                        .unwrap()
                }),
            )
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::new(SecurityConfig::default()),
                apply,
            ));
        let resp = router
            .oneshot(axum::http::Request::builder().uri("/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.headers().get(axum::http::header::SERVER).is_none());
        assert!(resp.headers().get("x-powered-by").is_none());
    }

    #[tokio::test]
    async fn hsts_is_opt_in() {
        let router = Router::new()
            .route("/x", get(|| async { StatusCode::OK }))
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::new(SecurityConfig::default()),
                apply,
            ));
        let resp = router
            .oneshot(axum::http::Request::builder().uri("/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.headers().get(axum::http::header::STRICT_TRANSPORT_SECURITY).is_none());
    }
}
