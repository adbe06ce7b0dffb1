//! Redis-backed presence store for multi-node deployments.
//!
//! Values are written with `SET key value PX ttl`, so Redis expires them
//! on the same schedule as the local cache. Change notifications use
//! Redis pub/sub.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::ports::{ChannelMessages, PresenceStore, PresenceStoreError};

fn unavailable(e: redis::RedisError) -> PresenceStoreError {
    PresenceStoreError::Unavailable(e.to_string())
}

/// Redis presence store.
///
/// Commands share one multiplexed connection; each subscription opens a
/// dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisPresenceStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisPresenceStore {
    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self, PresenceStoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(unavailable)?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PresenceStoreError> {
        let mut conn = self.conn.clone();
        let millis = ttl.as_millis().max(1) as u64;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PresenceStoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.map_err(unavailable)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), PresenceStoreError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(unavailable)
    }

    async fn subscribe(&self, channel: &str) -> Result<ChannelMessages, PresenceStoreError> {
        let mut pubsub = self
            .client
            .get_async_connection()
            .await
            .map_err(unavailable)?
            .into_pubsub();
        pubsub.subscribe(channel).await.map_err(unavailable)?;

        let messages = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable presence message");
                    None
                }
            }
        });
        Ok(messages.boxed())
    }
}
