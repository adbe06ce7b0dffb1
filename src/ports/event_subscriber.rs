//! EventSubscriber port
//!
//! A subscription is keyed by (event type, handler name).

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, Event, EventType};

/// Something that reacts to published events.
///
/// Handlers may see the same event more than once and each attempt runs
/// under the bus timeout, so `handle` should be idempotent and short.
///
/// ```ignore
/// struct Audit;
///
/// #[async_trait]
/// impl EventHandler for Audit {
///     async fn handle(&self, event: Event) -> Result<(), DomainError> {
///         tracing::info!(target: "audit", event_id = %event.id, "event");
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "audit"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<(), DomainError>;

    /// Stable name; keys metrics, breakers and dead letters.
    fn name(&self) -> &'static str;
}

pub trait EventSubscriber: Send + Sync {
    /// `DuplicateSubscription` when the handler name is already
    /// registered for `event_type`.
    fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> Result<(), DomainError>;

    /// Registers in order and stops at the first duplicate, keeping what
    /// was already added.
    fn subscribe_all(
        &self,
        event_types: &[EventType],
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), DomainError> {
        event_types
            .iter()
            .try_for_each(|event_type| self.subscribe(*event_type, Arc::clone(&handler)))
    }

    /// Absent subscriptions are ignored.
    fn unsubscribe(&self, event_type: EventType, handler_name: &str);
}
