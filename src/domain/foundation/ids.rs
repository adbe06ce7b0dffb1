//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Opaque, non-blank string identifier. Blank values are refused both
/// by `new` and when deserializing.
macro_rules! non_blank_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(id: String) -> Result<Self, Self::Error> {
                Self::new(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

non_blank_id!(
    /// User as named by the upstream identity provider.
    UserId,
    "user_id"
);

non_blank_id!(
    /// A task, project or comment thread that several users can edit.
    ResourceId,
    "resource_id"
);

impl ResourceId {
    /// Topic carrying updates for this resource.
    pub fn topic(&self) -> String {
        format!("resource:{}", self.0)
    }
}

/// Server-assigned id of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Server process in a multi-node deployment. Tags presence change
/// notifications so a node can drop its own echoes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(format!("node-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_are_rejected() {
        match UserId::new("   ") {
            Err(ValidationError::EmptyField { field }) => assert_eq!(field, "user_id"),
            other => panic!("expected EmptyField, got {:?}", other),
        }
        assert!(ResourceId::new("").is_err());
    }

    #[test]
    fn blank_ids_are_rejected_when_deserializing() {
        assert!(serde_json::from_str::<UserId>(r#""""#).is_err());
        let user: UserId = serde_json::from_str(r#""alice""#).unwrap();
        assert_eq!(user.as_str(), "alice");
        assert_eq!(serde_json::to_string(&user).unwrap(), r#""alice""#);
    }

    #[test]
    fn resource_topic_is_prefixed() {
        let id = ResourceId::new("task-42").unwrap();
        assert_eq!(id.topic(), "resource:task-42");
        assert_eq!(id.to_string(), "task-42");
    }

    #[test]
    fn connection_id_parses_its_own_display() {
        let id = ConnectionId::new();
        assert_ne!(id, ConnectionId::new());
        assert_eq!(id.to_string().parse::<ConnectionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn random_node_ids_differ() {
        let a = NodeId::random();
        assert!(a.as_str().starts_with("node-"));
        assert_ne!(a, NodeId::random());
    }
}
