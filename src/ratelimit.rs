// SPDX-License-Identifier: MIT
//!
//! Per-IP token-bucket request limiter (§4.5).
//!
//! GCRA rate limiting keyed per client IP via `governor`, the same
//! construction the bearer-auth limiter in the surrounding workspace's
//! gateway crate uses for its own per-IP bucket. Idle keys are reclaimed by
//! a background sweep using governor's own `retain_recent`, so an attacker
//! rotating source IPs can't grow the table without bound.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter as GovernorLimiter};
use tracing::warn;

use crate::context::is_external;
use crate::lifecycle::{worker_pair, WorkerHandle};
use crate::proxy;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub cleanup_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { requests_per_second: 5, burst_size: 20, cleanup_interval: Duration::from_secs(60) }
    }
}

type KeyedLimiter<C> = GovernorLimiter<IpAddr, DashMapStateStore<IpAddr>, C>;

pub struct RateLimiter<C: Clock = DefaultClock> {
    config: RateLimiterConfig,
    limiter: KeyedLimiter<C>,
    clock: C,
}

impl RateLimiter<DefaultClock> {
    pub fn new(config: RateLimiterConfig) -> Arc<Self> {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> Arc<Self> {
        let quota = quota_from(&config);
        Arc::new(Self { config, limiter: GovernorLimiter::keyed(quota), clock })
    }

    /// `Ok(())` if a cell was available and consumed, `Err(retry_after)`
    /// otherwise, with the wait computed from the limiter's own clock
    /// rather than hardcoded (§4.5's `Retry-After` must reflect reality).
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.limiter.check_key(&ip).map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    fn sweep(&self) {
        self.limiter.retain_recent();
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> WorkerHandle
    where
        C: Send + Sync + 'static,
    {
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
        });
        handle
    }
}

fn quota_from(config: &RateLimiterConfig) -> Quota {
    let rate = NonZeroU32::new(config.requests_per_second.max(1)).unwrap();
    let burst = NonZeroU32::new(config.burst_size.max(1)).unwrap();
    Quota::per_second(rate).allow_burst(burst)
}

/// Middleware applying the limiter only to requests marked external (§4.5).
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(peer): ConnectInfo<std::net::SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if !is_external(&req) {
        return next.run(req).await;
    }

    let effective_ip = proxy::current().get_client_ip(peer.ip(), req.headers());

    match limiter.check(effective_ip) {
        Ok(()) => next.run(req).await,
        Err(wait) => {
            let retry_after = wait.as_secs().max(1);
            warn!(%effective_ip, retry_after, "rate limit exceeded");
            let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from_str(&retry_after.to_string()).unwrap(),
            );
            response
        }
    }
}
