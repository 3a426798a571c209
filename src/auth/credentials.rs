// SPDX-License-Identifier: MIT
//!
//! Constant-time credential validation (§4.7) and the IP allow-list (§3, §4.7).
//!
//! Account management is a named non-goal (§1): there is exactly one static
//! username/password pair, configured up front. Comparison always walks the
//! full bytes of both sides via [`subtle::ConstantTimeEq`] so wrong-length
//! guesses take the same time as right-length ones.

use std::sync::RwLock;

use subtle::ConstantTimeEq;

use crate::ipset::IpSet;

/// A single configured username/password pair.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Validates posted credentials against a configured pair, and checks
/// client IPs against the access-control allow-list. Both live behind one
/// lock because they are reconfigured together on a config reload.
pub struct CredentialValidator {
    inner: RwLock<Inner>,
}

struct Inner {
    credentials: Option<Credentials>,
    allow_list: IpSet,
}

impl CredentialValidator {
    pub fn new(credentials: Option<Credentials>, allow_list: IpSet) -> Self {
        Self { inner: RwLock::new(Inner { credentials, allow_list }) }
    }

    /// `true` iff a credential pair is configured. When `false`, the auth
    /// gate forwards every request unauthenticated (§4.9 step 1).
    pub fn is_enabled(&self) -> bool {
        self.inner.read().unwrap().credentials.is_some()
    }

    /// Constant-time comparison against the configured pair. Returns
    /// `false`, never panics, when no pair is configured.
    pub fn validate(&self, username: &str, password: &str) -> bool {
        let guard = self.inner.read().unwrap();
        let Some(creds) = guard.credentials.as_ref() else {
            return false;
        };
        let user_ok: bool = creds.username.as_bytes().ct_eq(username.as_bytes()).into();
        let pass_ok: bool = creds.password.as_bytes().ct_eq(password.as_bytes()).into();
        // Both sides are always evaluated (no short-circuit) so the total
        // comparison work is independent of which field first diverges.
        user_ok & pass_ok
    }

    pub fn is_ip_allowed(&self, ip: std::net::IpAddr) -> bool {
        self.inner.read().unwrap().allow_list.contains(ip)
    }

    /// Replace both the credential pair and the allow-list atomically under
    /// a single write lock (§4.7 "reload takes a write lock and atomically
    /// replaces both sets").
    pub fn reload(&self, credentials: Option<Credentials>, allow_list: IpSet) {
        let mut guard = self.inner.write().unwrap();
        guard.credentials = credentials;
        guard.allow_list = allow_list;
    }
}
