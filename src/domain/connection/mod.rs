//! Connection domain - lifecycle of a single WebSocket connection.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Lifecycle state of a client connection.
///
/// ```text
/// Connecting --> Open --> Closing --> Closed
///      |                                ^
///      +---------- (rejected) ----------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Only open connections receive broadcasts and inbound dispatch.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl StateMachine for ConnectionState {
    fn successors(&self) -> &'static [Self] {
        use ConnectionState::*;
        match self {
            Connecting => &[Open, Closed],
            Open => &[Closing],
            Closing => &[Closed],
            Closed => &[],
        }
    }
}

/// Why the server is closing a connection. Maps onto WebSocket close codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client asked to close, or the socket ended cleanly.
    Normal,
    /// Server is shutting down.
    GoingAway,
    /// Admission refused or the client broke protocol rules.
    PolicyViolation(String),
    /// No activity within the heartbeat timeout.
    IdleTimeout,
    /// Unexpected server-side failure.
    InternalError,
}

impl CloseReason {
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::GoingAway => 1001,
            CloseReason::PolicyViolation(_) | CloseReason::IdleTimeout => 1008,
            CloseReason::InternalError => 1011,
        }
    }

    pub fn description(&self) -> String {
        match self {
            CloseReason::Normal => "normal closure".to_string(),
            CloseReason::GoingAway => "server shutting down".to_string(),
            CloseReason::PolicyViolation(reason) => reason.clone(),
            CloseReason::IdleTimeout => "heartbeat timeout".to_string(),
            CloseReason::InternalError => "internal error".to_string(),
        }
    }
}
