//! Fixed-window rate limiter held in process memory.
//!
//! Counters are node-local, which suits both connection admission and
//! per-connection frame limits: neither needs cluster-wide agreement.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::ports::{Quota, RateDecision, RateLimitError, RateLimitKey, RateLimiter};

use super::config::{RateLimitConfig, WindowLimit};

#[derive(Debug, Clone, Copy)]
struct Window {
    used: u32,
    opened_at: Instant,
    length: Duration,
}

impl Window {
    fn open(now: Instant, length: Duration) -> Self {
        Self {
            used: 0,
            opened_at: now,
            length,
        }
    }

    fn is_over(&self, now: Instant) -> bool {
        now.duration_since(self.opened_at) >= self.length
    }

    fn time_left(&self, now: Instant) -> Duration {
        self.length.saturating_sub(now.duration_since(self.opened_at))
    }
}

/// Per-key fixed windows; a key's window starts at its first request.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    windows: DashMap<RateLimitKey, Window>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn limit_for(&self, key: &RateLimitKey) -> WindowLimit {
        self.config.limit_for(key.scope())
    }

    /// Number of keys with a window, expired or not.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop expired windows. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_over(now));
        before.saturating_sub(self.windows.len())
    }

    /// Purge expired windows every `every` until shutdown.
    pub async fn run_purger(&self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(every);
        interval.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        debug!(purged, "Purged expired rate limit windows");
                    }
                }
            }
        }
    }
}

fn validate(key: &RateLimitKey) -> Result<(), RateLimitError> {
    match key {
        RateLimitKey::SourceIp(ip) if ip.trim().is_empty() => {
            Err(RateLimitError::InvalidKey(key.to_string()))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn acquire(&self, key: &RateLimitKey) -> Result<RateDecision, RateLimitError> {
        validate(key)?;
        let limit = self.limit_for(key);
        let now = Instant::now();

        let mut window = self
            .windows
            .entry(key.clone())
            .or_insert_with(|| Window::open(now, limit.window()));
        if window.is_over(now) {
            *window = Window::open(now, limit.window());
        }

        let resets_in = window.time_left(now);
        if window.used >= limit.requests {
            return Ok(RateDecision::Denied {
                scope: key.scope(),
                limit: limit.requests,
                retry_after: resets_in,
            });
        }

        window.used += 1;
        Ok(RateDecision::Allowed(Quota {
            limit: limit.requests,
            remaining: limit.requests - window.used,
            resets_in,
        }))
    }

    async fn remaining(&self, key: &RateLimitKey) -> Result<Quota, RateLimitError> {
        validate(key)?;
        let limit = self.limit_for(key);
        let now = Instant::now();

        let (used, resets_in) = self
            .windows
            .get(key)
            .filter(|window| !window.is_over(now))
            .map(|window| (window.used, window.time_left(now)))
            .unwrap_or((0, limit.window()));

        Ok(Quota {
            limit: limit.requests,
            remaining: limit.requests.saturating_sub(used),
            resets_in,
        })
    }

    async fn forget(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        self.windows.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ConnectionId;
    use crate::ports::RateLimitScope;

    fn limiter(per_ip: u32) -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(RateLimitConfig {
            per_ip: WindowLimit::per_minute(per_ip),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn quota_is_spent_then_refused() {
        let limiter = limiter(3);
        let key = RateLimitKey::source_ip("192.168.1.1");

        for expected_remaining in [2, 1, 0] {
            match limiter.acquire(&key).await.unwrap() {
                RateDecision::Allowed(quota) => assert_eq!(quota.remaining, expected_remaining),
                denied => panic!("expected allowance, got {:?}", denied),
            }
        }

        let denied = limiter.acquire(&key).await.unwrap();
        assert!(matches!(
            denied,
            RateDecision::Denied { scope: RateLimitScope::Ip, limit: 3, .. }
        ));
        assert!(denied.retry_after_secs().unwrap() <= 60);
    }

    #[tokio::test]
    async fn remaining_does_not_spend() {
        let limiter = limiter(10);
        let key = RateLimitKey::source_ip("10.0.0.1");

        assert_eq!(limiter.remaining(&key).await.unwrap().remaining, 10);
        for _ in 0..3 {
            limiter.acquire(&key).await.unwrap();
        }
        assert_eq!(limiter.remaining(&key).await.unwrap().remaining, 7);
        assert_eq!(limiter.remaining(&key).await.unwrap().remaining, 7);
    }

    #[tokio::test]
    async fn forget_restores_quota() {
        let limiter = limiter(1);
        let key = RateLimitKey::source_ip("10.0.0.2");

        assert!(limiter.acquire(&key).await.unwrap().is_allowed());
        assert!(!limiter.acquire(&key).await.unwrap().is_allowed());

        limiter.forget(&key).await.unwrap();
        assert!(limiter.acquire(&key).await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn window_reopens_after_its_length() {
        let limiter = limiter(1);
        let key = RateLimitKey::source_ip("10.0.0.3");

        assert!(limiter.acquire(&key).await.unwrap().is_allowed());
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!limiter.acquire(&key).await.unwrap().is_allowed());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.acquire(&key).await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_windows() {
        let limiter = InMemoryRateLimiter::with_defaults();
        limiter
            .acquire(&RateLimitKey::Connection(ConnectionId::new()))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.acquire(&RateLimitKey::Node).await.unwrap();
        assert_eq!(limiter.tracked_keys(), 2);

        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn scopes_and_addresses_are_independent() {
        let limiter = limiter(1);
        let first = RateLimitKey::source_ip("1.1.1.1");

        assert!(limiter.acquire(&first).await.unwrap().is_allowed());
        assert!(!limiter.acquire(&first).await.unwrap().is_allowed());
        assert!(limiter
            .acquire(&RateLimitKey::source_ip("2.2.2.2"))
            .await
            .unwrap()
            .is_allowed());
        assert!(limiter.acquire(&RateLimitKey::Node).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn blank_address_is_rejected() {
        let limiter = InMemoryRateLimiter::with_defaults();
        let result = limiter.acquire(&RateLimitKey::source_ip("  ")).await;
        assert!(matches!(result, Err(RateLimitError::InvalidKey(_))));
    }
}
