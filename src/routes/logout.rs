// SPDX-License-Identifier: MIT
//!
//! `POST {prefix}/api/logout` (§4.11).

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::auth::session::{build_logout_cookie, SessionRecord};
use crate::router::AppState;

pub async fn post(State(state): State<AppState>, session: Option<Extension<SessionRecord>>) -> Response {
    if let Some(Extension(record)) = session {
        state.sessions.invalidate_session(&record.token);
    }
    let mut resp = StatusCode::OK.into_response();
    resp.headers_mut().insert(
        axum::http::header::SET_COOKIE,
        HeaderValue::from_str(&build_logout_cookie()).unwrap(),
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::TestClock;
    use crate::auth::credentials::Credentials;
    use crate::auth::failure_limiter::{FailureLimiter, FailureLimiterConfig};
    use crate::auth::session::SessionConfig;
    use crate::auth::{CredentialValidator, SessionStore};
    use crate::controller::ListenerController;
    use crate::ipset::IpSet;
    use crate::ratelimit::{RateLimiter, RateLimiterConfig};
    use axum::body::Body;
    use axum::routing::post as post_route;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_state() -> AppState {
        let clock = Arc::new(TestClock::new());
        let credentials = Arc::new(CredentialValidator::new(
            Some(Credentials { username: "admin".to_string(), password: "secret".to_string() }),
            IpSet::default(),
        ));
        AppState {
            credentials: credentials.clone(),
            failure_limiter: FailureLimiter::with_clock(FailureLimiterConfig::default(), clock),
            sessions: SessionStore::new(SessionConfig::default()),
            rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
            api_prefix: String::new(),
            login_page_path: "/login".to_string(),
            controller: ListenerController::new(credentials),
        }
    }

    #[tokio::test]
    async fn logout_without_session_still_clears_cookie() {
        let state = app_state();
        let app = Router::new().route("/api/logout", post_route(post)).with_state(state);
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers().get(axum::http::header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=-1"));
    }

    #[tokio::test]
    async fn logout_invalidates_attached_session() {
        let state = app_state();
        let record = state.sessions.create_session("admin");
        assert!(state.sessions.validate_session(&record.token).is_some());

        let app = Router::new().route("/api/logout", post_route(post)).with_state(state.clone());
        let mut req =
            axum::http::Request::builder().method("POST").uri("/api/logout").body(Body::empty()).unwrap();
        req.extensions_mut().insert(record.clone());
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.sessions.validate_session(&record.token).is_none());
    }
}
