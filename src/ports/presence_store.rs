//! PresenceStore port - shared key-value + pub/sub store.
//!
//! The store is the authoritative copy of presence across nodes. Only the
//! four primitives the presence tracker needs are exposed:
//! `SET key value TTL`, `GET key`, `PUBLISH channel message` and
//! `SUBSCRIBE channel`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Stream of raw messages received on a subscribed channel.
pub type ChannelMessages = BoxStream<'static, String>;

/// Errors raised by shared store adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PresenceStoreError {
    /// Backend unreachable or returned an error.
    #[error("presence store unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its deadline.
    #[error("presence store call timed out after {0:?}")]
    Timeout(Duration),

    /// Stored value could not be encoded or decoded.
    #[error("presence serialization error: {0}")]
    Serialization(String),
}

/// Port for the shared presence store.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PresenceStoreError>;

    /// Fetch the value under `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, PresenceStoreError>;

    /// Publish `message` to every subscriber of `channel`.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), PresenceStoreError>;

    /// Subscribe to `channel`. The stream ends if the subscription drops.
    async fn subscribe(&self, channel: &str) -> Result<ChannelMessages, PresenceStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn PresenceStore) {}

    #[test]
    fn timeout_error_mentions_duration() {
        let err = PresenceStoreError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
