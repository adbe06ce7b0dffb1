//! Presence tracker.
//!
//! The shared store holds the authoritative record for every user with a
//! TTL; each node keeps a bounded LRU cache in front of it. Updates are
//! fanned out to other nodes over a pub/sub channel tagged with the
//! origin node, so a node ignores its own notifications.

use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use super::cache::PresenceCache;
use crate::adapters::resilience::{call_guarded, InMemoryCircuitBreaker, RetryExecutor, RetryPolicy};
use crate::domain::foundation::{
    DomainError, ErrorCode, EventType, NodeId, Priority, PublishOptions, UserId,
};
use crate::domain::presence::{PresenceMetadata, PresenceRecord, PresenceStatus};
use crate::ports::{CircuitBreakerConfig, EventPublisher, PresenceStore, PresenceStoreError};

const STORE_TARGET: &str = "presence_store";

/// Presence tracker settings.
#[derive(Debug, Clone)]
pub struct PresenceSettings {
    /// Lifetime of a record in the store and the local cache.
    pub ttl: Duration,
    /// Maximum records held in the local cache.
    pub cache_capacity: usize,
    /// How often expired cache entries are dropped.
    pub cleanup_interval: Duration,
    /// Deadline for a single store call.
    pub store_timeout: Duration,
    /// Retry schedule for store writes.
    pub retry: RetryPolicy,
    /// Pub/sub channel carrying change notifications.
    pub channel: String,
    /// Prefix for store keys.
    pub key_prefix: String,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            cache_capacity: 10_000,
            cleanup_interval: Duration::from_secs(60),
            store_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default().with_max_delay(Duration::from_secs(2)),
            channel: "presence:changes".to_string(),
            key_prefix: "presence:".to_string(),
        }
    }
}

/// Change notification exchanged between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub origin: NodeId,
    pub record: PresenceRecord,
}

fn store_error(e: PresenceStoreError) -> DomainError {
    DomainError::new(ErrorCode::StoreUnavailable, e.to_string())
}

pub struct PresenceTracker {
    node_id: NodeId,
    store: Arc<dyn PresenceStore>,
    cache: Mutex<PresenceCache>,
    settings: PresenceSettings,
    breaker: InMemoryCircuitBreaker,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl PresenceTracker {
    pub fn new(node_id: NodeId, store: Arc<dyn PresenceStore>, settings: PresenceSettings) -> Self {
        Self {
            node_id,
            store,
            cache: Mutex::new(PresenceCache::new(settings.cache_capacity)),
            breaker: InMemoryCircuitBreaker::new(STORE_TARGET, CircuitBreakerConfig::default()),
            settings,
            publisher: None,
        }
    }

    /// Republish presence changes on the local event bus.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn settings(&self) -> &PresenceSettings {
        &self.settings
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    fn key_for(&self, user_id: &UserId) -> String {
        format!("{}{}", self.settings.key_prefix, user_id)
    }

    /// One guarded, time-limited store call.
    async fn store_call<T, F>(&self, operation: &str, call: F) -> Result<T, DomainError>
    where
        F: std::future::Future<Output = Result<T, PresenceStoreError>>,
    {
        let timeout = self.settings.store_timeout;
        call_guarded(&self.breaker, STORE_TARGET, async move {
            match time::timeout(timeout, call).await {
                Ok(result) => result.map_err(store_error),
                Err(_) => Err(DomainError::timeout(operation, timeout.as_millis())),
            }
        })
        .await
    }

    /// Record a user's status.
    ///
    /// The store write is retried with backoff. If every attempt fails the
    /// update is dropped: nothing is cached or broadcast.
    pub async fn update_presence(
        &self,
        user_id: UserId,
        status: PresenceStatus,
        metadata: PresenceMetadata,
    ) -> Result<PresenceRecord, DomainError> {
        let record = PresenceRecord::new(user_id, status, metadata);
        let key = self.key_for(&record.user_id);
        let value = serde_json::to_string(&record)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        let ttl = self.settings.ttl;

        let write = RetryExecutor::new(self.settings.retry.clone())
            .execute_if(
                "presence_set",
                |_| self.store_call("presence_set", self.store.set_with_ttl(&key, &value, ttl)),
                |e: &DomainError| !e.is(ErrorCode::CircuitOpen),
            )
            .await;

        if let Err(e) = write.result {
            warn!(
                user_id = %record.user_id,
                status = %status,
                attempts = write.attempts,
                error = %e,
                "Dropping presence update, store unavailable"
            );
            return Err(e);
        }

        let change = PresenceChange {
            origin: self.node_id.clone(),
            record: record.clone(),
        };
        match serde_json::to_string(&change) {
            Ok(message) => {
                if let Err(e) = self
                    .store_call("presence_publish", self.store.publish(&self.settings.channel, &message))
                    .await
                {
                    warn!(user_id = %record.user_id, error = %e, "Failed to announce presence change");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode presence change"),
        }

        self.cache.lock().insert(record.clone());
        self.announce_locally(&record).await;
        debug!(user_id = %record.user_id, status = %status, "Presence updated");
        Ok(record)
    }

    /// Current presence of a user, `None` when unknown or expired.
    pub async fn get_presence(&self, user_id: &UserId) -> Result<Option<PresenceRecord>, DomainError> {
        let ttl = self.settings.ttl;
        let cached = self.cache.lock().get_fresh(user_id, ttl);
        if let Some(record) = cached {
            return Ok(Some(record));
        }

        let key = self.key_for(user_id);
        let Some(raw) = self.store_call("presence_get", self.store.get(&key)).await? else {
            return Ok(None);
        };
        let record: PresenceRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Ignoring undecodable presence record");
                return Ok(None);
            }
        };
        if !record.is_fresh(ttl) {
            return Ok(None);
        }
        self.cache.lock().insert(record.clone());
        Ok(Some(record))
    }

    /// Apply a change notification received from the shared channel.
    ///
    /// Returns whether the local cache was updated.
    pub async fn handle_remote_change(&self, message: &str) -> bool {
        let change: PresenceChange = match serde_json::from_str(message) {
            Ok(change) => change,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed presence notification");
                return false;
            }
        };
        if change.origin == self.node_id {
            return false;
        }
        if !change.record.is_fresh(self.settings.ttl) {
            return false;
        }
        self.cache.lock().insert(change.record.clone());
        self.announce_locally(&change.record).await;
        true
    }

    async fn announce_locally(&self, record: &PresenceRecord) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let payload = json!({
            "userId": record.user_id,
            "status": record.status,
            "metadata": record.metadata,
            "lastUpdated": record.last_updated,
        });
        let options = PublishOptions::default()
            .with_priority(Priority::Low)
            .with_origin_user(record.user_id.clone());
        if let Err(e) = publisher
            .publish(EventType::PresenceChanged, payload, options)
            .await
        {
            warn!(user_id = %record.user_id, error = %e, "Failed to publish presence change locally");
        }
    }

    /// Drop cache entries older than the TTL.
    pub fn cleanup_expired(&self) -> usize {
        self.cache.lock().remove_expired(self.settings.ttl)
    }

    /// Periodically drop expired cache entries until shutdown.
    pub async fn run_cleanup(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.settings.cleanup_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Presence cleanup stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    let removed = self.cleanup_expired();
                    if removed > 0 {
                        debug!(removed, "Expired presence entries removed");
                    }
                }
            }
        }
    }

    /// Consume change notifications from other nodes until shutdown.
    ///
    /// A dropped subscription is re-established after a backoff delay.
    pub async fn run_subscriber(&self, mut shutdown: watch::Receiver<bool>) {
        let mut failures = 0u32;

        loop {
            let subscription = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
                subscription = self.store.subscribe(&self.settings.channel) => subscription,
            };

            match subscription {
                Ok(mut messages) => {
                    failures = 0;
                    info!(channel = %self.settings.channel, "Subscribed to presence changes");
                    loop {
                        tokio::select! {
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    info!("Presence subscriber stopping");
                                    return;
                                }
                            }
                            message = messages.next() => match message {
                                Some(message) => {
                                    self.handle_remote_change(&message).await;
                                }
                                None => {
                                    warn!("Presence subscription ended");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(error = %e, failures, "Presence subscribe failed");
                }
            }

            let delay = self.settings.retry.jittered_delay_for(failures.max(1));
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = time::sleep(delay) => {}
            }
        }
    }
}
