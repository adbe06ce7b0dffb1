//! WebSocket adapters for real-time client delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            EventBus                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!              │ subscribes                         ▲ publishes
//!              ▼                                    │
//! ┌──────────────────────────┐        ┌──────────────────────────────┐
//! │ WebSocketEventBridge     │        │ ConnectionManager            │
//! │ NotificationComposer     │──────► │  admission / rate limits     │
//! └──────────────────────────┘        │  inbound dispatch            │
//!                                     │  broadcast / heartbeat       │
//!                                     └──────────────────────────────┘
//!                                          │ mpsc per connection
//!                                          ▼
//!                                     ws_handler writer task → socket
//! ```
//!
//! # Components
//!
//! - [`messages`] - Wire envelope and message types
//! - [`connection_manager`] - Connection table and delivery
//! - [`handler`] - Axum WebSocket upgrade handler
//! - [`event_bridge`] - Bus events → client frames
//! - [`notifications`] - Targeted notification frames

pub mod connection_manager;
pub mod event_bridge;
pub mod handler;
pub mod messages;
pub mod notifications;

pub use connection_manager::{
    AdmittedConnection, BroadcastReport, ConnectionInfo, ConnectionManager, ConnectionSettings,
    Outbound,
};
pub use event_bridge::{WebSocketEventBridge, BRIDGED_EVENT_TYPES};
pub use handler::{websocket_router, ws_handler, ConnectParams, WebSocketState};
pub use messages::{ClientMessage, ProtocolError, ServerMessage, WireEnvelope};
pub use notifications::{NotificationComposer, NOTIFYING_EVENT_TYPES};
