//! Event bridge connecting domain events to WebSocket clients.
//!
//! Subscribes to client-visible domain events and fans them out through
//! the connection manager.
//!
//! # Event Flow
//!
//! ```text
//! Domain Event Published
//!          │
//!          ▼
//! ┌─────────────────────┐
//! │ WebSocketEventBridge │
//! └─────────────────────┘
//!          │
//!          ├── NOTIFICATION_READ ──► every connection of the reader
//!          ├── channel set ────────► connections subscribed to the channel
//!          └── otherwise ──────────► every open connection
//! ```
//!
//! `NOTIFICATION_CREATED` is not bridged; notifications are targeted and
//! delivered by the notification composer instead.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Event, EventType};
use crate::ports::{EventHandler, EventSubscriber};

use super::connection_manager::{BroadcastReport, ConnectionManager};
use super::messages::ServerMessage;

/// Event types forwarded to connected clients.
pub const BRIDGED_EVENT_TYPES: [EventType; 15] = [
    EventType::TaskCreated,
    EventType::TaskUpdated,
    EventType::TaskDeleted,
    EventType::TaskAssigned,
    EventType::TaskStatusChanged,
    EventType::ProjectCreated,
    EventType::ProjectUpdated,
    EventType::ProjectDeleted,
    EventType::CommentAdded,
    EventType::CommentUpdated,
    EventType::CommentDeleted,
    EventType::PresenceChanged,
    EventType::CollaboratorJoined,
    EventType::CollaboratorLeft,
    EventType::NotificationRead,
];

/// Bridge between the event bus and WebSocket connections.
///
/// Holds the manager weakly: the manager publishes to the same bus this
/// bridge is registered on.
pub struct WebSocketEventBridge {
    connections: Weak<ConnectionManager>,
}

impl WebSocketEventBridge {
    pub fn new(connections: &Arc<ConnectionManager>) -> Self {
        Self {
            connections: Arc::downgrade(connections),
        }
    }

    /// Create as an Arc (for sharing with event subscriber).
    pub fn new_shared(connections: &Arc<ConnectionManager>) -> Arc<Self> {
        Arc::new(Self::new(connections))
    }

    /// Subscribe to every bridged event type.
    pub fn register(self: &Arc<Self>, subscriber: &impl EventSubscriber) -> Result<(), DomainError> {
        subscriber.subscribe_all(&BRIDGED_EVENT_TYPES, self.clone())
    }

    async fn route(&self, connections: &ConnectionManager, event: Event) -> BroadcastReport {
        if event.event_type == EventType::NotificationRead {
            let Some(reader) = event.origin_user_id.as_ref() else {
                return BroadcastReport::default();
            };
            let message = ServerMessage::Event {
                event_type: event.event_type,
                payload: event.data.clone(),
            };
            return connections.send_to_user(reader, &message).await;
        }

        match event.metadata.channel.as_deref() {
            Some(channel) => {
                connections
                    .broadcast_to_topic(channel, event.event_type, event.data)
                    .await
            }
            None => connections.broadcast(event.event_type, event.data, None).await,
        }
    }
}

#[async_trait]
impl EventHandler for WebSocketEventBridge {
    async fn handle(&self, event: Event) -> Result<(), DomainError> {
        let Some(connections) = self.connections.upgrade() else {
            return Ok(());
        };
        let event_id = event.id.clone();
        let event_type = event.event_type;

        // Per-connection failures are already counted by the manager; one
        // slow client must not cause the bus to redeliver to everyone.
        let report = self.route(&connections, event).await;
        tracing::debug!(
            event_id = %event_id,
            event_type = %event_type,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Bridged event to clients"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "websocket_broadcast"
    }
}
