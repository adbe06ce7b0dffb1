//! Per-handler execution metrics.

use std::time::Duration;
use tokio::time::Instant;

use crate::domain::foundation::Timestamp;

/// Snapshot of a handler's execution history.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub average_latency: Duration,
    pub last_execution_time: Option<Timestamp>,
}

impl HandlerMetrics {
    pub fn total_executions(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Failed share of all attempts, 0.0 when nothing ran yet.
    pub fn failure_ratio(&self) -> f64 {
        let total = self.total_executions();
        if total == 0 {
            return 0.0;
        }
        self.failure_count as f64 / total as f64
    }
}

/// Mutable tracker behind a [`HandlerMetrics`] snapshot.
#[derive(Debug)]
pub(crate) struct HandlerStats {
    success_count: u64,
    failure_count: u64,
    total_latency: Duration,
    last_execution_time: Option<Timestamp>,
    registered_at: Instant,
    last_success: Option<Instant>,
    last_offered: Option<Instant>,
}

impl HandlerStats {
    pub(crate) fn new() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            total_latency: Duration::ZERO,
            last_execution_time: None,
            registered_at: Instant::now(),
            last_success: None,
            last_offered: None,
        }
    }

    /// An event was routed to the handler, whether or not its circuit let
    /// the call through.
    pub(crate) fn offered(&mut self) {
        self.last_offered = Some(Instant::now());
    }

    pub(crate) fn record(&mut self, succeeded: bool, latency: Duration) {
        if succeeded {
            self.success_count += 1;
            self.last_success = Some(Instant::now());
        } else {
            self.failure_count += 1;
        }
        self.total_latency = self.total_latency.saturating_add(latency);
        self.last_execution_time = Some(Timestamp::now());
    }

    pub(crate) fn snapshot(&self) -> HandlerMetrics {
        let total = self.success_count + self.failure_count;
        let average_latency = if total == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total_latency.as_nanos() / total as u128) as u64)
        };
        HandlerMetrics {
            success_count: self.success_count,
            failure_count: self.failure_count,
            average_latency,
            last_execution_time: self.last_execution_time,
        }
    }

    /// Events kept arriving but none was handled successfully within
    /// `stale_after`. A handler that simply saw no traffic is never stale.
    pub(crate) fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        let Some(offered) = self.last_offered else {
            return false;
        };
        let last_ok = self.last_success.unwrap_or(self.registered_at);
        offered > last_ok && now.duration_since(last_ok) > stale_after
    }

    /// Failure ratio above `cutoff` once at least `min_executions` ran.
    pub(crate) fn is_unhealthy(&self, cutoff: f64, min_executions: u64) -> bool {
        let snapshot = self.snapshot();
        snapshot.total_executions() >= min_executions && snapshot.failure_ratio() > cutoff
    }
}
