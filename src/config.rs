// SPDX-License-Identifier: MIT
//!
//! Configuration schema and layered loader (§6, §10.2).
//!
//! Mirrors the external-interfaces configuration surface exactly: optional
//! credentials (absent disables auth entirely), an access-control allow-list,
//! a trusted-proxy set, the external bind port, and the tunable parameters
//! for each of the token-bucket, auth-failure, session, and security
//! components. A partial YAML document still produces a fully-populated
//! `Config` because every field has a `#[serde(default = "...")]` helper.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::failure_limiter::FailureLimiterConfig;
use crate::auth::session::SessionConfig;
use crate::error::AppError;
use crate::http::security::SecurityConfig;
use crate::ipset::IpSet;
use crate::ratelimit::RateLimiterConfig;

fn default_external_bind_port() -> Option<u16> {
    None
}

fn default_token_bucket() -> TokenBucketConfig {
    TokenBucketConfig::default()
}

fn default_auth_failure() -> AuthFailureConfig {
    AuthFailureConfig::default()
}

fn default_session() -> SessionSettings {
    SessionSettings::default()
}

fn default_security() -> SecuritySettings {
    SecuritySettings::default()
}

fn default_api_prefix() -> String {
    String::new()
}

fn default_login_page_path() -> String {
    "/login".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBucketConfig {
    pub rps: u32,
    pub burst: u32,
    pub cleanup_interval_secs: u64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        let d = RateLimiterConfig::default();
        Self {
            rps: d.requests_per_second,
            burst: d.burst_size,
            cleanup_interval_secs: d.cleanup_interval.as_secs(),
        }
    }
}

impl From<&TokenBucketConfig> for RateLimiterConfig {
    fn from(c: &TokenBucketConfig) -> Self {
        Self {
            requests_per_second: c.rps,
            burst_size: c.burst,
            cleanup_interval: Duration::from_secs(c.cleanup_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthFailureConfig {
    pub max_failures: u32,
    pub failure_window_secs: u64,
    pub lockout_duration_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for AuthFailureConfig {
    fn default() -> Self {
        let d = FailureLimiterConfig::default();
        Self {
            max_failures: d.max_failures,
            failure_window_secs: d.failure_window.as_secs(),
            lockout_duration_secs: d.lockout_duration.as_secs(),
            sweep_interval_secs: d.sweep_interval.as_secs(),
        }
    }
}

impl From<&AuthFailureConfig> for FailureLimiterConfig {
    fn from(c: &AuthFailureConfig) -> Self {
        Self {
            max_failures: c.max_failures,
            failure_window: Duration::from_secs(c.failure_window_secs),
            lockout_duration: Duration::from_secs(c.lockout_duration_secs),
            sweep_interval: Duration::from_secs(c.sweep_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub duration_secs: u64,
    pub max_per_principal: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let d = SessionConfig::default();
        Self {
            duration_secs: d.session_duration.as_secs(),
            max_per_principal: d.max_per_principal,
            cleanup_interval_secs: d.cleanup_interval.as_secs(),
        }
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(c: &SessionSettings) -> Self {
        Self {
            session_duration: Duration::from_secs(c.duration_secs),
            max_per_principal: c.max_per_principal,
            cleanup_interval: Duration::from_secs(c.cleanup_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub enable_hsts: bool,
    pub hsts_max_age_secs: u64,
    pub request_body_limit_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        let d = SecurityConfig::default();
        Self {
            enable_hsts: d.enable_hsts,
            hsts_max_age_secs: d.hsts_max_age,
            request_body_limit_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub allow_list: Vec<String>,
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default = "default_external_bind_port")]
    pub external_bind_port: Option<u16>,
    #[serde(default = "default_token_bucket")]
    pub token_bucket: TokenBucketConfig,
    #[serde(default = "default_auth_failure")]
    pub auth_failure: AuthFailureConfig,
    #[serde(default = "default_session")]
    pub session: SessionSettings,
    #[serde(default = "default_security")]
    pub security: SecuritySettings,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_login_page_path")]
    pub login_page_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: None,
            allow_list: Vec::new(),
            trusted_proxies: Vec::new(),
            external_bind_port: default_external_bind_port(),
            token_bucket: default_token_bucket(),
            auth_failure: default_auth_failure(),
            session: default_session(),
            security: default_security(),
            api_prefix: default_api_prefix(),
            login_page_path: default_login_page_path(),
        }
    }
}

impl Config {
    pub fn allow_list(&self) -> Result<IpSet, AppError> {
        IpSet::parse(&self.allow_list)
            .map_err(|e| AppError::Configuration(format!("allow_list: {e}")))
    }

    pub fn trusted_proxies(&self) -> Result<IpSet, AppError> {
        IpSet::parse(&self.trusted_proxies)
            .map_err(|e| AppError::Configuration(format!("trusted_proxies: {e}")))
    }
}

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/session-fabric/config.yaml"));
    paths.push(PathBuf::from("/etc/session-fabric/config.yml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("session-fabric/config.yaml"));
        paths.push(cfg.join("session-fabric/config.yml"));
    }

    paths.push(PathBuf::from(".session-fabric.yaml"));
    paths.push(PathBuf::from(".session-fabric.yml"));

    paths
}

/// Load configuration by deep-merging every discovered layer, lowest
/// priority first, with an optional explicit `--config` path applied last.
/// An explicit path that is missing or fails to parse is a `Configuration`
/// error, not a panic; a missing *search-path* layer is simply skipped.
pub fn load(explicit: Option<&Path>) -> Result<Config, AppError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            let layer = read_layer(&path)?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(path) = explicit {
        let layer = read_layer(path)?;
        merge_yaml(&mut merged, layer);
    }

    if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        return Ok(Config::default());
    }
    serde_yaml::from_value(merged)
        .map_err(|e| AppError::Configuration(format!("parsing merged configuration: {e}")))
}

fn read_layer(path: &Path) -> Result<serde_yaml::Value, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::Configuration(format!("reading {}: {e}", path.display())))?;
    serde_yaml::from_str(&text)
        .map_err(|e| AppError::Configuration(format!("parsing {}: {e}", path.display())))
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry =
                    d.entry(k).or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}
