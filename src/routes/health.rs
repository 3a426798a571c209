// SPDX-License-Identifier: MIT
//!
//! `GET {prefix}/api/health` (§11) — unauthenticated liveness probe, a
//! public path in the same sense as the login page and its assets.

use axum::response::Json;
use serde_json::{json, Value};

pub async fn get() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
