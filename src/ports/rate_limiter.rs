//! RateLimiter port - quotas for the WebSocket transport.
//!
//! New connections are throttled per source address and across the node;
//! inbound frames are throttled per established connection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::foundation::ConnectionId;

/// Port for quota accounting.
///
/// Implementations must be safe to call concurrently for the same key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Spend one unit of `key`'s quota.
    async fn acquire(&self, key: &RateLimitKey) -> Result<RateDecision, RateLimitError>;

    /// Quota left for `key`, without spending any.
    async fn remaining(&self, key: &RateLimitKey) -> Result<Quota, RateLimitError>;

    /// Forget everything recorded for `key`.
    async fn forget(&self, key: &RateLimitKey) -> Result<(), RateLimitError>;
}

/// What a quota is counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Every admission on this node.
    Node,
    /// Admissions from one peer address.
    SourceIp(String),
    /// Inbound frames on one connection.
    Connection(ConnectionId),
}

impl RateLimitKey {
    pub fn source_ip(ip: impl Into<String>) -> Self {
        Self::SourceIp(ip.into())
    }

    pub fn scope(&self) -> RateLimitScope {
        match self {
            Self::Node => RateLimitScope::Global,
            Self::SourceIp(_) => RateLimitScope::Ip,
            Self::Connection(_) => RateLimitScope::Connection,
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("global"),
            Self::SourceIp(ip) => write!(f, "ip:{}", ip),
            Self::Connection(id) => write!(f, "connection:{}", id),
        }
    }
}

/// Which configured limit applies.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    Global,
    Ip,
    Connection,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Global => "global",
            RateLimitScope::Ip => "ip",
            RateLimitScope::Connection => "connection",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window ends.
    pub resets_in: Duration,
}

/// Outcome of [`RateLimiter::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed(Quota),
    Denied {
        scope: RateLimitScope,
        limit: u32,
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed(_))
    }

    /// Whole seconds a refused caller should wait, never zero.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RateDecision::Allowed(_) => None,
            RateDecision::Denied { retry_after, .. } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),

    #[error("invalid rate limit key: {0}")]
    InvalidKey(String),
}
