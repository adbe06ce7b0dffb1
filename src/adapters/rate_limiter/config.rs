//! Quotas for each throttled scope.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::RateLimitScope;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admissions across the whole node.
    pub global: WindowLimit,
    /// Admissions from one source address.
    pub per_ip: WindowLimit,
    /// Inbound frames on one connection.
    pub per_connection: WindowLimit,
}

/// `requests` allowed in each window of `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub requests: u32,
    pub window_secs: u32,
}

impl WindowLimit {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests,
            window_secs: 60,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_secs))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: WindowLimit::per_minute(10_000),
            per_ip: WindowLimit::per_minute(30),
            per_connection: WindowLimit::per_minute(120),
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, scope: RateLimitScope) -> WindowLimit {
        match scope {
            RateLimitScope::Global => self.global,
            RateLimitScope::Ip => self.per_ip,
            RateLimitScope::Connection => self.per_connection,
        }
    }
}
