// SPDX-License-Identifier: MIT
//!
//! Per-IP auth-failure sliding window + lockout (§4.4).
//!
//! The one invariant that is easy to get wrong: once an IP is locked out,
//! further failed attempts during the lockout must NOT extend it. That
//! means the "are we already locked?" check and the "set lockedUntil" write
//! have to happen inside the same critical section — there is no window
//! between them where another task could race a fresh failure in.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use crate::lifecycle::{worker_pair, WorkerHandle};

#[derive(Debug, Clone)]
pub struct FailureLimiterConfig {
    pub max_failures: u32,
    pub failure_window: Duration,
    pub lockout_duration: Duration,
    pub sweep_interval: Duration,
}

impl Default for FailureLimiterConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            failure_window: Duration::from_secs(5 * 60),
            lockout_duration: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct Record {
    failures: Vec<Instant>,
    locked_until: Option<Instant>,
}

pub struct FailureLimiter {
    config: FailureLimiterConfig,
    records: DashMap<IpAddr, Record>,
    clock: Arc<dyn Clock>,
}

impl FailureLimiter {
    pub fn new(config: FailureLimiterConfig) -> Arc<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: FailureLimiterConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self { config, records: DashMap::new(), clock })
    }

    pub fn is_blocked(&self, ip: IpAddr) -> (bool, Duration) {
        let now = self.clock.now();
        match self.records.get(&ip).and_then(|r| r.locked_until) {
            Some(until) if until > now => (true, until - now),
            _ => (false, Duration::ZERO),
        }
    }

    /// Record a failed attempt. Returns `(now_blocked, lockout_duration)`.
    pub fn record_failure(&self, ip: IpAddr) -> (bool, Duration) {
        let now = self.clock.now();
        let mut record = self.records.entry(ip).or_default();

        // Already locked: do not touch the failure list, do not extend.
        // `entry()` holds this shard's lock across the whole check-then-write
        // sequence below, so no other task can race a fresh failure in.
        if let Some(until) = record.locked_until {
            if until > now {
                return (true, until - now);
            }
            // Lockout has expired: clear it and start fresh.
            record.locked_until = None;
            record.failures.clear();
        }

        let window_start = now.checked_sub(self.config.failure_window).unwrap_or(now);
        record.failures.retain(|&t| t >= window_start);
        record.failures.push(now);

        if record.failures.len() as u32 >= self.config.max_failures {
            record.locked_until = Some(now + self.config.lockout_duration);
            (true, self.config.lockout_duration)
        } else {
            (false, Duration::ZERO)
        }
    }

    pub fn record_success(&self, ip: IpAddr) {
        self.records.remove(&ip);
    }

    /// `max_failures` if no record (or the lockout has elapsed); `-1` while
    /// locked; otherwise `max_failures - valid_count`, floored at 0.
    pub fn remaining_attempts(&self, ip: IpAddr) -> i64 {
        let now = self.clock.now();
        let Some(record) = self.records.get(&ip) else {
            return self.config.max_failures as i64;
        };
        if let Some(until) = record.locked_until {
            if until > now {
                return -1;
            }
            return self.config.max_failures as i64;
        }
        let window_start = now.checked_sub(self.config.failure_window).unwrap_or(now);
        let valid = record.failures.iter().filter(|&&t| t >= window_start).count() as i64;
        (self.config.max_failures as i64 - valid).max(0)
    }

    pub fn stats(&self) -> (usize, usize) {
        let now = self.clock.now();
        let total = self.records.len();
        let blocked =
            self.records.iter().filter(|r| matches!(r.locked_until, Some(u) if u > now)).count();
        (total, blocked)
    }

    fn sweep(&self) {
        let now = self.clock.now();
        let window_start = now.checked_sub(self.config.failure_window).unwrap_or(now);
        let before = self.records.len();
        self.records.retain(|_, record| {
            let lockout_active = matches!(record.locked_until, Some(u) if u > now);
            if lockout_active {
                return true;
            }
            record.locked_until = None;
            record.failures.retain(|&t| t >= window_start);
            !record.failures.is_empty()
        });
        let removed = before - self.records.len();
        if removed > 0 {
            debug!(removed, "auth-failure sweep removed stale records");
        }
    }

    /// Spawn the background sweeper. Returns a handle whose `close()`
    /// blocks until the task has exited.
    pub fn spawn_sweeper(self: &Arc<Self>) -> WorkerHandle {
        let (handle, mut signal) = worker_pair();
        let this = self.clone();
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = signal.stopped() => break,
                    _ = ticker.tick() => this.sweep(),
                }
            }
            signal.acknowledge();
            info!("auth-failure sweeper stopped");
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::TestClock;

    fn limiter() -> (Arc<FailureLimiter>, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let limiter = FailureLimiter::with_clock(
            FailureLimiterConfig {
                max_failures: 5,
                failure_window: Duration::from_secs(300),
                lockout_duration: Duration::from_secs(900),
                sweep_interval: Duration::from_secs(60),
            },
            clock.clone(),
        );
        (limiter, clock)
    }

    fn addr() -> IpAddr {
        "203.0.113.5".parse().unwrap()
    }

    #[test]
    fn below_threshold_never_blocks() {
        let (limiter, _clock) = limiter();
        for _ in 0..4 {
            let (blocked, _) = limiter.record_failure(addr());
            assert!(!blocked);
            assert!(!limiter.is_blocked(addr()).0);
        }
    }

    #[test]
    fn fifth_failure_triggers_lockout() {
        let (limiter, _clock) = limiter();
        for _ in 0..4 {
            limiter.record_failure(addr());
        }
        let (blocked, duration) = limiter.record_failure(addr());
        assert!(blocked);
        assert_eq!(duration, Duration::from_secs(900));
        assert!(limiter.is_blocked(addr()).0);
    }

    #[test]
    fn lockout_is_not_extended_by_further_failures() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(addr());
        }
        let (_, initial_remaining) = limiter.is_blocked(addr());
        clock.advance(Duration::from_secs(60));
        let (blocked, remaining) = limiter.record_failure(addr());
        assert!(blocked);
        // remaining should have decreased by ~60s, not reset to 900s.
        assert!(remaining < initial_remaining);
        assert!(remaining <= Duration::from_secs(900 - 60));
    }

    #[test]
    fn lockout_expires_after_duration() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(addr());
        }
        assert!(limiter.is_blocked(addr()).0);
        clock.advance(Duration::from_secs(901));
        assert!(!limiter.is_blocked(addr()).0);
    }

    #[test]
    fn success_clears_record() {
        let (limiter, _clock) = limiter();
        for _ in 0..3 {
            limiter.record_failure(addr());
        }
        limiter.record_success(addr());
        assert_eq!(limiter.remaining_attempts(addr()), 5);
    }

    #[test]
    fn remaining_attempts_counts_down() {
        let (limiter, _clock) = limiter();
        assert_eq!(limiter.remaining_attempts(addr()), 5);
        limiter.record_failure(addr());
        assert_eq!(limiter.remaining_attempts(addr()), 4);
        limiter.record_failure(addr());
        assert_eq!(limiter.remaining_attempts(addr()), 3);
    }

    #[test]
    fn remaining_attempts_is_negative_one_while_locked() {
        let (limiter, _clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(addr());
        }
        assert_eq!(limiter.remaining_attempts(addr()), -1);
    }

    #[test]
    fn remaining_attempts_resets_after_lockout_elapses() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            limiter.record_failure(addr());
        }
        clock.advance(Duration::from_secs(901));
        assert_eq!(limiter.remaining_attempts(addr()), 5);
    }

    #[test]
    fn failures_outside_window_are_pruned() {
        let (limiter, clock) = limiter();
        limiter.record_failure(addr());
        limiter.record_failure(addr());
        clock.advance(Duration::from_secs(301));
        // Both prior failures have aged out of the 300s window.
        assert_eq!(limiter.remaining_attempts(addr()), 5);
        for _ in 0..4 {
            limiter.record_failure(addr());
        }
        assert!(!limiter.is_blocked(addr()).0);
    }

    #[test]
    fn stats_reports_total_and_blocked() {
        let (limiter, _clock) = limiter();
        limiter.record_failure(addr());
        let other: IpAddr = "198.51.100.9".parse().unwrap();
        for _ in 0..5 {
            limiter.record_failure(other);
        }
        let (total, blocked) = limiter.stats();
        assert_eq!(total, 2);
        assert_eq!(blocked, 1);
    }

    #[tokio::test]
    async fn sweeper_can_be_started_and_stopped() {
        let (limiter, _clock) = limiter();
        let handle = limiter.spawn_sweeper();
        handle.close().await;
    }
}
