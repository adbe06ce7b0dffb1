//! Event infrastructure for domain event publishing and handling.
//!
//! This module provides the core types of the event distribution core:
//! - `EventId` - Unique identifier for events (deduplication)
//! - `EventType` - Closed set of domain event kinds (routing key)
//! - `Priority` / `EventMetadata` - Delivery policy derived at publish time
//! - `PublishOptions` - Caller overrides merged over priority defaults
//! - `Event` - Immutable record handed to every subscribed handler

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Timestamp, UserId, ValidationError};

/// Current schema version stamped on newly created events.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Unique identifier for events (used for deduplication).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an EventId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed enumeration of domain event kinds.
///
/// Handlers register against these variants; dispatch is a map lookup.
/// The serialized form doubles as the `type` field of WebSocket frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskAssigned,
    TaskStatusChanged,
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    CommentAdded,
    CommentUpdated,
    CommentDeleted,
    PresenceChanged,
    CollaboratorJoined,
    CollaboratorLeft,
    NotificationCreated,
    NotificationRead,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 16] = [
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
        EventType::NotificationCreated,
        EventType::NotificationRead,
    ];

    /// Wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TaskCreated => "TASK_CREATED",
            EventType::TaskUpdated => "TASK_UPDATED",
            EventType::TaskDeleted => "TASK_DELETED",
            EventType::TaskAssigned => "TASK_ASSIGNED",
            EventType::TaskStatusChanged => "TASK_STATUS_CHANGED",
            EventType::ProjectCreated => "PROJECT_CREATED",
            EventType::ProjectUpdated => "PROJECT_UPDATED",
            EventType::ProjectDeleted => "PROJECT_DELETED",
            EventType::CommentAdded => "COMMENT_ADDED",
            EventType::CommentUpdated => "COMMENT_UPDATED",
            EventType::CommentDeleted => "COMMENT_DELETED",
            EventType::PresenceChanged => "PRESENCE_CHANGED",
            EventType::CollaboratorJoined => "COLLABORATOR_JOINED",
            EventType::CollaboratorLeft => "COLLABORATOR_LEFT",
            EventType::NotificationCreated => "NOTIFICATION_CREATED",
            EventType::NotificationRead => "NOTIFICATION_READ",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::invalid_format("event_type", format!("unknown event type '{}'", s)))
    }
}

/// Delivery priority; drives the retry budget and the per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// Delivery metadata derived at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub priority: Priority,

    /// Attempts already made for this delivery (0 at publish time).
    pub retry_count: u32,

    /// Maximum number of handler invocations (including the first).
    pub max_retries: u32,

    /// Logical routing topic; `None` means "everyone".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    pub ttl_ms: u64,

    pub acknowledgment_required: bool,
}

impl EventMetadata {
    /// Defaults for a priority, before caller overrides are applied.
    pub fn defaults_for(priority: Priority, max_retries: u32) -> Self {
        let (ttl_ms, acknowledgment_required) = match priority {
            Priority::High => (300_000, true),
            Priority::Medium => (60_000, false),
            Priority::Low => (30_000, false),
        };
        Self {
            priority,
            retry_count: 0,
            max_retries,
            channel: None,
            ttl_ms,
            acknowledgment_required,
        }
    }

    /// Merges caller overrides over the priority defaults.
    pub fn resolve(options: &PublishOptions, default_max_retries: u32) -> Self {
        let priority = options.priority.unwrap_or_default();
        let mut metadata = Self::defaults_for(priority, default_max_retries);
        if let Some(max_retries) = options.max_retries {
            metadata.max_retries = max_retries.max(1);
        }
        if let Some(channel) = &options.channel {
            metadata.channel = Some(channel.clone());
        }
        if let Some(ttl_ms) = options.ttl_ms {
            metadata.ttl_ms = ttl_ms;
        }
        if let Some(ack) = options.acknowledgment_required {
            metadata.acknowledgment_required = ack;
        }
        metadata
    }

    /// Number of attempts a handler gets for this event.
    ///
    /// Only HIGH priority events escalate through the backoff schedule.
    pub fn attempt_budget(&self) -> u32 {
        match self.priority {
            Priority::High => self.max_retries.max(1),
            Priority::Medium | Priority::Low => 1,
        }
    }
}

/// Caller overrides for a single publish.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub priority: Option<Priority>,
    pub max_retries: Option<u32>,
    pub channel: Option<String>,
    pub ttl_ms: Option<u64>,
    pub acknowledgment_required: Option<bool>,
    pub origin_user_id: Option<UserId>,
    pub correlation_id: Option<String>,
}

impl PublishOptions {
    pub fn high_priority() -> Self {
        Self {
            priority: Some(Priority::High),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_origin_user(mut self, user_id: UserId) -> Self {
        self.origin_user_id = Some(user_id);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Immutable domain event delivered to handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,

    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Opaque structured payload.
    pub data: JsonValue,

    pub timestamp: Timestamp,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_user_id: Option<UserId>,

    /// Groups causally related events; defaults to the event's own id.
    pub correlation_id: String,

    pub schema_version: u32,

    pub metadata: EventMetadata,
}

impl Event {
    /// Creates a new event with a fresh id and the current time.
    pub fn new(event_type: EventType, data: JsonValue, metadata: EventMetadata) -> Self {
        let id = EventId::new();
        Self {
            correlation_id: id.to_string(),
            id,
            event_type,
            data,
            timestamp: Timestamp::now(),
            origin_user_id: None,
            schema_version: CURRENT_SCHEMA_VERSION,
            metadata,
        }
    }

    /// Builds an event from caller options, applying metadata defaults.
    pub fn from_options(
        event_type: EventType,
        data: JsonValue,
        options: &PublishOptions,
        default_max_retries: u32,
    ) -> Self {
        let mut event = Self::new(
            event_type,
            data,
            EventMetadata::resolve(options, default_max_retries),
        );
        event.origin_user_id = options.origin_user_id.clone();
        if let Some(correlation_id) = &options.correlation_id {
            event.correlation_id = correlation_id.clone();
        }
        event
    }

    /// Copy of this event as seen by a particular delivery attempt.
    pub fn for_attempt(&self, retry_count: u32) -> Self {
        let mut event = self.clone();
        event.metadata.retry_count = retry_count;
        event
    }

    /// Deserialize payload to a specific type.
    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
