//! Audit trail handler.
//!
//! Emits one structured record per domain event on the `audit` tracing
//! target, so a subscriber layer can route it to durable storage.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Event, EventType};
use crate::ports::EventHandler;

/// Event types recorded in the audit trail.
pub const AUDITED_EVENT_TYPES: [EventType; 11] = [
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
];

#[derive(Debug, Default)]
pub struct AuditLogHandler;

impl AuditLogHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for AuditLogHandler {
    async fn handle(&self, event: Event) -> Result<(), DomainError> {
        tracing::info!(
            target: "audit",
            event_id = %event.id,
            event_type = %event.event_type,
            correlation_id = %event.correlation_id,
            origin_user_id = event.origin_user_id.as_ref().map(|u| u.as_str()),
            attempt = event.metadata.retry_count,
            occurred_at = %event.timestamp.to_rfc3339(),
            "domain event"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "audit_log"
    }
}
