//! In-memory presence store for single-node deployments and tests.
//!
//! Values expire on read once their TTL has elapsed. Channels are tokio
//! broadcast channels created on first use.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::ports::{ChannelMessages, PresenceStore, PresenceStoreError};

const CHANNEL_CAPACITY: usize = 1024;

struct StoredValue {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryPresenceStore {
    values: Mutex<HashMap<String, StoredValue>>,
    channels: DashMap<String, broadcast::Sender<String>>,
    failing_writes: AtomicU32,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with `Unavailable`.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of unexpired keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.values
            .lock()
            .values()
            .filter(|v| v.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Drop expired values. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut values = self.values.lock();
        let before = values.len();
        values.retain(|_, stored| stored.expires_at > now);
        before - values.len()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PresenceStoreError> {
        if self.take_injected_failure() {
            return Err(PresenceStoreError::Unavailable("injected write failure".to_string()));
        }
        // Keys that are never read again would otherwise stay forever.
        self.purge_expired();
        self.values.lock().insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PresenceStoreError> {
        let now = Instant::now();
        let mut values = self.values.lock();
        match values.get(key) {
            Some(stored) if stored.expires_at > now => Ok(Some(stored.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), PresenceStoreError> {
        // No receivers is not an error.
        let _ = self.sender(channel).send(message.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<ChannelMessages, PresenceStoreError> {
        let receiver = self.sender(channel).subscribe();
        let messages = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Presence subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let store = InMemoryPresenceStore::new();
        store.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn writes_prune_keys_nobody_reads() {
        let store = InMemoryPresenceStore::new();
        store.set_with_ttl("presence:gone", "v", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        store.set_with_ttl("presence:here", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.values.lock().len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.values.lock().len(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let store = InMemoryPresenceStore::new();
        let mut messages = store.subscribe("presence:changes").await.unwrap();
        store.publish("presence:changes", "hello").await.unwrap();
        assert_eq!(messages.next().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryPresenceStore::new();
        store.fail_next_writes(1);
        assert!(store.set_with_ttl("k", "v", Duration::from_secs(1)).await.is_err());
        assert!(store.set_with_ttl("k", "v", Duration::from_secs(1)).await.is_ok());
    }
}
