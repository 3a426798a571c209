// SPDX-License-Identifier: MIT
//!
//! `GET {prefix}/api/external-status` (§6) — reports whether the external
//! listener is running and on which port.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::router::AppState;

#[derive(Debug, Serialize)]
pub struct ExternalStatus {
    enabled: bool,
    port: Option<u16>,
}

pub async fn get(State(state): State<AppState>) -> Json<ExternalStatus> {
    let port = state.controller.external_port();
    Json(ExternalStatus { enabled: port.is_some(), port })
}
