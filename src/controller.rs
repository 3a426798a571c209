// SPDX-License-Identifier: MIT
//!
//! Listener controller (§4.13): starts/stops the external listener at
//! runtime and mediates the four auth-reconfiguration transitions.
//!
//! The credential validator is never torn down and rebuilt — "enabled" and
//! "disabled" are just states of the same object (`credentials: None` means
//! disabled). That keeps the allow-list and the gate's identity stable
//! across a reconfiguration instead of forcing every route layer to be
//! rebuilt when an operator merely flips auth on or off.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::Mutex;
use tracing::info;

use crate::auth::credentials::{CredentialValidator, Credentials};
use crate::ipset::IpSet;
use crate::net::external::{self, ExternalListenerHandle};

/// The auth-relevant slice of configuration, before/after a reconfiguration.
#[derive(Debug, Clone)]
pub struct AuthChangeConfig {
    pub credentials: Option<Credentials>,
    pub allow_list: IpSet,
}

#[derive(Clone)]
pub struct ListenerController {
    credentials: Arc<CredentialValidator>,
    external: Arc<Mutex<Option<ExternalListenerHandle>>>,
}

impl ListenerController {
    pub fn new(credentials: Arc<CredentialValidator>) -> Self {
        Self { credentials, external: Arc::new(Mutex::new(None)) }
    }

    /// Mediate the four auth-reconfiguration transitions. `old` is informational
    /// (used only for the transition log line); the actual state change is
    /// fully determined by `new`.
    pub fn apply_auth_changes(&self, old: Option<&AuthChangeConfig>, new: AuthChangeConfig) {
        let transition = match (old.map(|c| c.credentials.is_some()), new.credentials.is_some()) {
            (None | Some(false), true) => "disabled->enabled",
            (Some(true), false) => "enabled->disabled",
            (Some(true), true) => "enabled->enabled",
            (None | Some(false), false) => "disabled->disabled",
        };
        info!(transition, "applying auth reconfiguration");
        self.credentials.reload(new.credentials, new.allow_list);
    }

    /// Start the external listener. Idempotent: if one is already running,
    /// this is a no-op that returns the existing port.
    pub async fn start_external(&self, addr: SocketAddr, app: Router) -> std::io::Result<u16> {
        let mut guard = self.external.lock().await;
        if let Some(existing) = guard.as_ref() {
            return Ok(existing.port());
        }
        let handle = external::start(addr, app).await?;
        let port = handle.port();
        *guard = Some(handle);
        Ok(port)
    }

    /// Stop the external listener. No-op if it isn't running.
    pub async fn stop_external(&self) {
        let handle = self.external.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn external_port(&self) -> Option<u16> {
        self.external.try_lock().ok().and_then(|g| g.as_ref().map(|h| h.port()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipset::IpSet;
    use axum::routing::get;

    fn creds(u: &str, p: &str) -> Credentials {
        Credentials { username: u.to_string(), password: p.to_string() }
    }

    #[test]
    fn disabled_to_enabled_sets_credentials() {
        let validator = Arc::new(CredentialValidator::new(None, IpSet::default()));
        let controller = ListenerController::new(validator.clone());
        controller.apply_auth_changes(
            None,
            AuthChangeConfig { credentials: Some(creds("admin", "secret")), allow_list: IpSet::default() },
        );
        assert!(validator.is_enabled());
    }

    #[test]
    fn enabled_to_disabled_clears_but_retains_object() {
        let validator = Arc::new(CredentialValidator::new(Some(creds("admin", "secret")), IpSet::default()));
        let controller = ListenerController::new(validator.clone());
        let old = AuthChangeConfig { credentials: Some(creds("admin", "secret")), allow_list: IpSet::default() };
        controller.apply_auth_changes(Some(&old), AuthChangeConfig { credentials: None, allow_list: IpSet::default() });
        assert!(!validator.is_enabled());
    }

    #[tokio::test]
    async fn starting_external_twice_is_idempotent() {
        let validator = Arc::new(CredentialValidator::new(None, IpSet::default()));
        let controller = ListenerController::new(validator);
        let app = Router::new().route("/health", get(|| async { "ok" }));
        let port1 = controller.start_external("127.0.0.1:0".parse().unwrap(), app.clone()).await.unwrap();
        let port2 = controller.start_external("127.0.0.1:0".parse().unwrap(), app).await.unwrap();
        assert_eq!(port1, port2);
        controller.stop_external().await;
    }

    #[tokio::test]
    async fn stopping_when_not_running_is_a_no_op() {
        let validator = Arc::new(CredentialValidator::new(None, IpSet::default()));
        let controller = ListenerController::new(validator);
        controller.stop_external().await;
    }
}
