// SPDX-License-Identifier: MIT
//!
//! `GET {prefix}/api/csrf-token` (§4.8, §6).

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::csrf::issue;

#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    token: String,
}

pub async fn get() -> Response {
    let (token, set_cookie) = issue();
    let mut resp = (StatusCode::OK, Json(CsrfTokenResponse { token })).into_response();
    resp.headers_mut().insert(axum::http::header::SET_COOKIE, HeaderValue::from_str(&set_cookie).unwrap());
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get as get_route;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn returns_token_and_sets_cookie() {
        let app = Router::new().route("/api/csrf-token", get_route(get));
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/api/csrf-token").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(axum::http::header::SET_COOKIE).is_some());
    }
}
