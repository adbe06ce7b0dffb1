//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, the event model and error types
//! that form the vocabulary of the real-time core.

mod errors;
mod events;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{
    Event, EventId, EventMetadata, EventType, Priority, PublishOptions, CURRENT_SCHEMA_VERSION,
};
pub use ids::{ConnectionId, NodeId, ResourceId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
