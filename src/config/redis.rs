//! Redis configuration

use redis::IntoConnectionInfo;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Shared presence store. Without a URL the node runs alone with an
/// in-memory store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: Option<String>,

    /// Connect deadline at startup
    pub timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 5,
        }
    }
}

impl RedisConfig {
    /// Configured URL; blank counts as unset.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = self.url() {
            url.into_connection_info()
                .map_err(|e| ValidationError::InvalidRedisUrl(e.to_string()))?;
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("redis.timeout_secs"));
        }
        Ok(())
    }
}
