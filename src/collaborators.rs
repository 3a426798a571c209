// SPDX-License-Identifier: MIT
//!
//! Trait seams for subsystems explicitly out of scope for this crate (§1, §6):
//! the agent-session runtime and its event log, markdown/thought streaming
//! buffers, file upload/download storage, periodic prompt delivery,
//! UI-preferences persistence, static-asset serving, and JSON validation of
//! business payloads. This crate never implements any of them — it only
//! defines the narrow interface the auth gate and router need in order to
//! forward requests to something that does, so a real implementation can be
//! wired in without this crate knowing its internals.

use axum::extract::Request;
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;

/// Whatever sits behind an authenticated request once the gate has
/// forwarded it: the agent-session runtime, static-asset serving, business
/// payload handling, and so on. A single object-safe seam keeps the router
/// decoupled from any concrete implementation.
pub trait ProtectedHandlerGraph: Send + Sync {
    fn handle(&self, req: Request) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<F, Fut> ProtectedHandlerGraph for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, req: Request) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(self(req))
    }
}

/// Delivery channel for session events (agent message, thought, tool call,
/// plan, permission request, queue update, error) emitted by the
/// out-of-scope agent-session runtime. This crate forwards the already
/// authenticated WebSocket connection to an implementer of this trait; it
/// never inspects event payloads itself.
pub trait SessionEventSink: Send + Sync {
    fn send_event(&self, session_id: &str, event_json: &str);
}

/// UI-preferences persistence, consumed only through this interface — the
/// concrete storage (file, database, whatever) lives outside this crate.
pub trait UiPreferencesStore: Send + Sync {
    fn load(&self, principal: &str) -> Option<String>;
    fn save(&self, principal: &str, preferences_json: &str);
}
