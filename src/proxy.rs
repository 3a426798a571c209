// SPDX-License-Identifier: MIT
//!
//! Trusted-proxy evaluator (§4.3).
//!
//! Resolves the *effective* client IP for policy decisions, honoring
//! forwarded-IP headers only from peers that are themselves configured as
//! trusted proxies. This prevents an arbitrary client from spoofing its own
//! IP via `X-Forwarded-For` when no proxy sits in front of this service.
//!
//! A single process-wide instance is installed at startup and swapped
//! atomically on reconfiguration; callers go through [`current`], which
//! falls back to "direct peer only" behavior when nothing has been
//! installed yet (e.g. in unit tests that construct handlers directly).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, OnceLock, RwLock};

use axum::http::HeaderMap;

use crate::ipset::IpSet;

/// Evaluates whether a peer is a trusted proxy and, if so, resolves the
/// effective client IP from forwarded headers.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyEvaluator {
    proxies: IpSet,
}

impl TrustedProxyEvaluator {
    pub fn new(proxies: IpSet) -> Self {
        Self { proxies }
    }

    pub fn is_trusted(&self, addr: IpAddr) -> bool {
        self.proxies.contains(addr)
    }

    /// Resolve the effective client IP for a request whose direct peer is
    /// `peer`. See §4.3 for the precedence rules.
    pub fn get_client_ip(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        if self.proxies.is_empty() {
            return peer;
        }
        if !self.is_trusted(peer) {
            return peer;
        }
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(first) = xff.split(',').next() {
                if let Some(ip) = parse_client_ip(first.trim()) {
                    return ip;
                }
            }
        }
        if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            if let Some(ip) = parse_client_ip(xri.trim()) {
                return ip;
            }
        }
        peer
    }
}

/// Parse an address string that may be a bare IP, `host:port`, or
/// `[ipv6]:port`. Returns `None` for empty or non-parseable input.
pub fn parse_client_ip(s: &str) -> Option<IpAddr> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some(ip);
    }
    // `[::1]:8080` or bare `[::1]`
    if let Some(rest) = s.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            if let Ok(ip) = rest[..end].parse::<IpAddr>() {
                return Some(ip);
            }
        }
        return None;
    }
    // `a.b.c.d:port`
    if let Some((host, _port)) = s.rsplit_once(':') {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
    }
    None
}

/// True for IPv4 loopback (`127.0.0.0/8`), IPv6 loopback (`::1`), and the
/// IPv4-mapped IPv6 loopback (`::ffff:127.0.0.1`).
pub fn is_loopback_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                return true;
            }
            match v6.to_ipv4_mapped() {
                Some(v4) => v4.is_loopback(),
                None => false,
            }
        }
    }
}

// ── Process-wide installed instance ────────────────────────────────────────

static CURRENT: OnceLock<RwLock<Option<Arc<TrustedProxyEvaluator>>>> = OnceLock::new();

fn slot() -> &'static RwLock<Option<Arc<TrustedProxyEvaluator>>> {
    CURRENT.get_or_init(|| RwLock::new(None))
}

/// Install (or replace) the process-wide evaluator.
pub fn install(evaluator: TrustedProxyEvaluator) {
    *slot().write().unwrap() = Some(Arc::new(evaluator));
}

/// The installed evaluator, or a deny-all (direct-peer-only) default when
/// none has been installed.
pub fn current() -> Arc<TrustedProxyEvaluator> {
    slot()
        .read()
        .unwrap()
        .clone()
        .unwrap_or_else(|| Arc::new(TrustedProxyEvaluator::default()))
}
