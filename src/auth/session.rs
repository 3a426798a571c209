// SPDX-License-Identifier: MIT
//!
//! Session-token store (§4.6).
//!
//! Tokens are 32 cryptographically random bytes, hex-encoded (64 chars).
//! Records live only in process memory — there is no persistence layer, by
//! design (§3: "no persistence"). A per-principal cap evicts the oldest
//! session(s) on overflow so one compromised or forgetful client can't grow
//! the map without bound.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::RngCore;
use time::{format_description, OffsetDateTime};
use tracing::{debug, info};

use crate::lifecycle::{worker_pair, WorkerHandle};

pub const COOKIE_NAME: &str = "session_token";

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token: String,
    pub principal: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
    /// Wall-clock counterpart of `expires_at`, used only to render the
    /// cookie's `Expires` attribute (HTTP dates are wall-clock, `Instant`
    /// is monotonic and has no calendar representation).
    pub expires_at_wall: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_duration: Duration,
    pub max_per_principal: usize,
    pub cleanup_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(24 * 60 * 60),
            max_per_principal: 10,
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

pub struct SessionStore {
    config: SessionConfig,
    sessions: DashMap<String, SessionRecord>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Arc<Self> {
        Arc::new(Self { config, sessions: DashMap::new() })
    }

    pub fn create_session(&self, principal: &str) -> SessionRecord {
        let token = generate_token();
        let now = Instant::now();
        let now_wall = OffsetDateTime::now_utc();
        let record = SessionRecord {
            token: token.clone(),
            principal: principal.to_string(),
            issued_at: now,
            expires_at: now + self.config.session_duration,
            expires_at_wall: now_wall + self.config.session_duration,
        };

        // Evict oldest-issued sessions of this principal until strictly
        // fewer than max_per_principal remain (so the new one fits).
        if self.config.max_per_principal > 0 {
            let mut existing: Vec<(String, Instant)> = self
                .sessions
                .iter()
                .filter(|e| e.principal == principal)
                .map(|e| (e.key().clone(), e.issued_at))
                .collect();
            while existing.len() >= self.config.max_per_principal {
                existing.sort_by_key(|(_, issued)| *issued);
                let (oldest_token, _) = existing.remove(0);
                self.sessions.remove(&oldest_token);
            }
        }

        self.sessions.insert(token, record.clone());
        record
    }

    pub fn validate_session(&self, token: &str) -> Option<SessionRecord> {
        let now = Instant::now();
        match self.sessions.get(token) {
            Some(record) if record.expires_at > now => return Some(record.clone()),
            Some(_) => {}
            None => return None,
        }
        // Expired: delete and report invalid.
        self.sessions.remove(token);
        None
    }

    pub fn invalidate_session(&self, token: &str) {
        self.sessions.remove(token);
    }

    pub fn session_count_for(&self, principal: &str) -> usize {
        self.sessions.iter().filter(|e| e.principal == principal).count()
    }

    fn sweep(&self) {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, r| r.expires_at > now);
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(removed, "session sweep removed expired sessions");
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> WorkerHandle {
        let (handle, mut signal) = worker_pair();
        let this = self.clone();
        let interval = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = signal.stopped() => break,
                    _ = ticker.tick() => this.sweep(),
                }
            }
            signal.acknowledge();
            info!("session sweeper stopped");
        });
        handle
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Render the session cookie's `Set-Cookie` value.
pub fn build_session_cookie(record: &SessionRecord) -> String {
    let fmt = format_description::parse(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT",
    )
    .expect("static format description");
    let expires = record.expires_at_wall.format(&fmt).unwrap_or_default();
    format!(
        "{COOKIE_NAME}={}; HttpOnly; Secure; SameSite=Strict; Path=/; Expires={expires}",
        record.token
    )
}

/// Render the logout `Set-Cookie` value that clears the session cookie with
/// identical attributes to the one it replaces.
pub fn build_logout_cookie() -> String {
    format!("{COOKIE_NAME}=; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age=-1")
}
