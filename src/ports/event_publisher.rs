//! EventPublisher port
//!
//! Mutations call `publish` once they have committed. Delivery is
//! at-least-once, and a failing handler never undoes the ones that
//! already ran.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::foundation::{DomainError, EventId, EventType, PublishOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub event_id: EventId,
    pub event_type: EventType,
    /// Handlers that completed, after retries.
    pub handlers_invoked: usize,
}

/// ```ignore
/// let report = publisher
///     .publish(EventType::TaskUpdated, json!({ "taskId": id }), PublishOptions::high_priority())
///     .await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// A single aggregated error comes back when any handler gave up.
    async fn publish(
        &self,
        event_type: EventType,
        data: JsonValue,
        options: PublishOptions,
    ) -> Result<PublishReport, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[allow(dead_code)]
    fn usable_behind_arc(publisher: Arc<dyn EventPublisher>) -> Arc<dyn EventPublisher> {
        publisher
    }
}
