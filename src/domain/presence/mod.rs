//! Presence domain - per-user online status.
//!
//! A `PresenceRecord` is only meaningful for a bounded time: once its TTL
//! elapses without a refresh it must be treated as absent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::foundation::{Timestamp, UserId, ValidationError};

/// A user's current availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "ONLINE",
            PresenceStatus::Away => "AWAY",
            PresenceStatus::Busy => "BUSY",
            PresenceStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(PresenceStatus::Online),
            "AWAY" => Ok(PresenceStatus::Away),
            "BUSY" => Ok(PresenceStatus::Busy),
            "OFFLINE" => Ok(PresenceStatus::Offline),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown presence status '{}'", other),
            )),
        }
    }
}

/// Supplementary presence information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<Timestamp>,

    /// Free-form device descriptor (e.g. "web", "ios").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl PresenceMetadata {
    pub fn active_now() -> Self {
        Self {
            last_activity: Some(Timestamp::now()),
            device: None,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }
}

/// Presence snapshot for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub status: PresenceStatus,
    #[serde(default)]
    pub metadata: PresenceMetadata,
    pub last_updated: Timestamp,
}

impl PresenceRecord {
    /// Creates a record stamped with the current time.
    pub fn new(user_id: UserId, status: PresenceStatus, metadata: PresenceMetadata) -> Self {
        Self {
            user_id,
            status,
            metadata,
            last_updated: Timestamp::now(),
        }
    }

    /// True while the record is within its TTL.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        !self.last_updated.is_older_than(ttl)
    }
}
