//! WebSocket message protocol.
//!
//! Every frame in both directions is a JSON envelope:
//!
//! ```json
//! { "type": "JOIN_COLLABORATION", "payload": { "resourceId": "task-1" }, "timestamp": "2024-05-01T12:00:00Z" }
//! ```
//!
//! - Client → Server: `PING`, `SUBSCRIBE`, `UNSUBSCRIBE`, `JOIN_COLLABORATION`,
//!   `LEAVE_COLLABORATION`, `PRESENCE_UPDATE`, `NOTIFICATION_READ`
//! - Server → Client: `CONNECTED`, `PONG`, `ERROR`, `COLLABORATORS`, `PRESENCE`
//!   and every domain `EventType`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::domain::foundation::{ConnectionId, EventType, ResourceId, Timestamp, UserId};
use crate::domain::presence::{PresenceRecord, PresenceStatus};

/// Frame envelope shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,

    #[serde(default)]
    pub payload: JsonValue,

    /// RFC 3339; optional on inbound frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

// ============================================
// Client → Server Messages
// ============================================

/// Why an inbound frame could not be understood.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("invalid payload for {message_type}: {reason}")]
    InvalidPayload { message_type: String, reason: String },
}

impl ProtocolError {
    /// Code carried by the `ERROR` frame sent back to the client.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "MALFORMED_MESSAGE",
            ProtocolError::UnknownType(_) => "UNKNOWN_MESSAGE_TYPE",
            ProtocolError::InvalidPayload { .. } => "INVALID_PAYLOAD",
        }
    }
}

/// Messages a client can send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Ping,
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    JoinCollaboration { resource_id: ResourceId },
    LeaveCollaboration { resource_id: ResourceId },
    PresenceUpdate { status: PresenceStatus, device: Option<String> },
    NotificationRead { notification_id: String },
}

#[derive(Deserialize)]
struct TopicPayload {
    topic: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourcePayload {
    resource_id: String,
}

#[derive(Deserialize)]
struct PresencePayload {
    status: String,
    #[serde(default)]
    device: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPayload {
    notification_id: String,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: WireEnvelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: WireEnvelope) -> Result<Self, ProtocolError> {
        let message_type = envelope.message_type.as_str();
        let payload = envelope.payload;

        match message_type {
            "PING" => Ok(ClientMessage::Ping),
            "SUBSCRIBE" | "UNSUBSCRIBE" => {
                let TopicPayload { topic } = decode(message_type, payload)?;
                if topic.trim().is_empty() {
                    return Err(invalid(message_type, "topic cannot be empty"));
                }
                Ok(if message_type == "SUBSCRIBE" {
                    ClientMessage::Subscribe { topic }
                } else {
                    ClientMessage::Unsubscribe { topic }
                })
            }
            "JOIN_COLLABORATION" | "LEAVE_COLLABORATION" => {
                let ResourcePayload { resource_id } = decode(message_type, payload)?;
                let resource_id =
                    ResourceId::new(resource_id).map_err(|e| invalid(message_type, e))?;
                Ok(if message_type == "JOIN_COLLABORATION" {
                    ClientMessage::JoinCollaboration { resource_id }
                } else {
                    ClientMessage::LeaveCollaboration { resource_id }
                })
            }
            "PRESENCE_UPDATE" => {
                let PresencePayload { status, device } = decode(message_type, payload)?;
                let status = status
                    .parse::<PresenceStatus>()
                    .map_err(|e| invalid(message_type, e))?;
                Ok(ClientMessage::PresenceUpdate { status, device })
            }
            "NOTIFICATION_READ" => {
                let NotificationPayload { notification_id } = decode(message_type, payload)?;
                if notification_id.trim().is_empty() {
                    return Err(invalid(message_type, "notificationId cannot be empty"));
                }
                Ok(ClientMessage::NotificationRead { notification_id })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

fn invalid(message_type: &str, reason: impl ToString) -> ProtocolError {
    ProtocolError::InvalidPayload {
        message_type: message_type.to_string(),
        reason: reason.to_string(),
    }
}

fn decode<T: DeserializeOwned>(message_type: &str, payload: JsonValue) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|e| invalid(message_type, e))
}

// ============================================
// Server → Client Messages
// ============================================

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Connection admitted.
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
    },

    /// Reply to `PING`.
    Pong,

    /// Request could not be processed; the connection stays open.
    Error { code: String, message: String },

    /// Current collaborator set of a resource.
    Collaborators {
        resource_id: ResourceId,
        collaborators: Vec<UserId>,
    },

    /// A user's presence.
    Presence(PresenceRecord),

    /// Domain event forwarded from the event bus.
    Event {
        event_type: EventType,
        payload: JsonValue,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "CONNECTED",
            ServerMessage::Pong => "PONG",
            ServerMessage::Error { .. } => "ERROR",
            ServerMessage::Collaborators { .. } => "COLLABORATORS",
            ServerMessage::Presence(_) => "PRESENCE",
            ServerMessage::Event { event_type, .. } => event_type.as_str(),
        }
    }

    fn payload(&self) -> JsonValue {
        match self {
            ServerMessage::Connected {
                connection_id,
                user_id,
            } => json!({ "connectionId": connection_id, "userId": user_id }),
            ServerMessage::Pong => JsonValue::Null,
            ServerMessage::Error { code, message } => json!({ "code": code, "message": message }),
            ServerMessage::Collaborators {
                resource_id,
                collaborators,
            } => json!({ "resourceId": resource_id, "collaborators": collaborators }),
            ServerMessage::Presence(record) => serde_json::to_value(record).unwrap_or_default(),
            ServerMessage::Event { payload, .. } => payload.clone(),
        }
    }

    pub fn to_envelope(&self) -> WireEnvelope {
        WireEnvelope {
            message_type: self.type_name().to_string(),
            payload: self.payload(),
            timestamp: Some(Timestamp::now().to_rfc3339()),
        }
    }

    /// Serialized text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping_without_payload() {
        assert_eq!(ClientMessage::parse(r#"{"type":"PING"}"#).unwrap(), ClientMessage::Ping);
    }

    #[test]
    fn parses_join_collaboration() {
        let msg = ClientMessage::parse(
            r#"{"type":"JOIN_COLLABORATION","payload":{"resourceId":"task-9"},"timestamp":"2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinCollaboration {
                resource_id: ResourceId::new("task-9").unwrap()
            }
        );
    }

    #[test]
    fn parses_presence_update_case_insensitively() {
        let msg = ClientMessage::parse(
            r#"{"type":"PRESENCE_UPDATE","payload":{"status":"away","device":"ios"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::PresenceUpdate {
                status: PresenceStatus::Away,
                device: Some("ios".to_string())
            }
        );
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = ClientMessage::parse("{not json").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_MESSAGE");
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = ClientMessage::parse(r#"{"type":"SELF_DESTRUCT"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("SELF_DESTRUCT".to_string()));
    }

    #[test]
    fn missing_payload_field_is_invalid() {
        let err = ClientMessage::parse(r#"{"type":"SUBSCRIBE","payload":{}}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");

        let err = ClientMessage::parse(r#"{"type":"JOIN_COLLABORATION","payload":{"resourceId":"  "}}"#)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn server_messages_use_envelope_shape() {
        let text = ServerMessage::error("RATE_LIMIT_EXCEEDED", "slow down").to_text().unwrap();
        let value: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "ERROR");
        assert_eq!(value["payload"]["code"], "RATE_LIMIT_EXCEEDED");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn event_frames_use_event_type_name() {
        let msg = ServerMessage::Event {
            event_type: EventType::TaskUpdated,
            payload: json!({"taskId": "t-1"}),
        };
        let envelope = msg.to_envelope();
        assert_eq!(envelope.message_type, "TASK_UPDATED");
        assert_eq!(envelope.payload["taskId"], "t-1");
    }
}
