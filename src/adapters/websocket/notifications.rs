//! Notification composer.
//!
//! Turns domain events that concern specific users into
//! `NOTIFICATION_CREATED` frames delivered to those users' connections.
//!
//! | event | recipients |
//! |---|---|
//! | `TASK_ASSIGNED` | `data.assigneeId` |
//! | `COMMENT_ADDED` | every id in `data.mentions` |
//! | `NOTIFICATION_CREATED` | `data.userId` |
//!
//! The user who caused the event is never notified about it. Composed
//! notifications go straight to connections and are not republished on
//! the bus.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, Event, EventType, UserId};
use crate::ports::{EventHandler, EventSubscriber};

use super::connection_manager::ConnectionManager;
use super::messages::ServerMessage;

/// Event types the composer reacts to.
pub const NOTIFYING_EVENT_TYPES: [EventType; 3] = [
    EventType::TaskAssigned,
    EventType::CommentAdded,
    EventType::NotificationCreated,
];

pub struct NotificationComposer {
    connections: Weak<ConnectionManager>,
}

impl NotificationComposer {
    pub fn new(connections: &Arc<ConnectionManager>) -> Self {
        Self {
            connections: Arc::downgrade(connections),
        }
    }

    pub fn new_shared(connections: &Arc<ConnectionManager>) -> Arc<Self> {
        Arc::new(Self::new(connections))
    }

    pub fn register(self: &Arc<Self>, subscriber: &impl EventSubscriber) -> Result<(), DomainError> {
        subscriber.subscribe_all(&NOTIFYING_EVENT_TYPES, self.clone())
    }

    /// Users to notify, minus the event's originator.
    fn recipients(event: &Event) -> BTreeSet<UserId> {
        let ids: Vec<&JsonValue> = match event.event_type {
            EventType::TaskAssigned => event.data.get("assigneeId").into_iter().collect(),
            EventType::CommentAdded => event
                .data
                .get("mentions")
                .and_then(JsonValue::as_array)
                .map(|mentions| mentions.iter().collect())
                .unwrap_or_default(),
            EventType::NotificationCreated => event.data.get("userId").into_iter().collect(),
            _ => Vec::new(),
        };

        ids.into_iter()
            .filter_map(JsonValue::as_str)
            .filter_map(|id| UserId::new(id).ok())
            .filter(|user| event.origin_user_id.as_ref() != Some(user))
            .collect()
    }

    fn kind(event_type: EventType) -> &'static str {
        match event_type {
            EventType::TaskAssigned => "TASK_ASSIGNED",
            EventType::CommentAdded => "MENTION",
            _ => "GENERAL",
        }
    }

    fn compose(event: &Event, recipient: &UserId) -> ServerMessage {
        ServerMessage::Event {
            event_type: EventType::NotificationCreated,
            payload: json!({
                "notificationId": Uuid::new_v4().to_string(),
                "userId": recipient,
                "kind": Self::kind(event.event_type),
                "sourceEventId": event.id,
                "data": event.data,
            }),
        }
    }
}

#[async_trait]
impl EventHandler for NotificationComposer {
    async fn handle(&self, event: Event) -> Result<(), DomainError> {
        let Some(connections) = self.connections.upgrade() else {
            return Ok(());
        };
        for recipient in Self::recipients(&event) {
            let message = Self::compose(&event, &recipient);
            let report = connections.send_to_user(&recipient, &message).await;
            tracing::debug!(
                event_id = %event.id,
                user_id = %recipient,
                delivered = report.delivered,
                "Notification composed"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "notification_composer"
    }
}
