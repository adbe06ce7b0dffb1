//! Domain layer containing the real-time core's types and rules.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, events, errors)
//! - `connection` - WebSocket connection lifecycle
//! - `presence` - Per-user online status records
//! - `collaboration` - Bounded per-resource collaborator sets

pub mod collaboration;
pub mod connection;
pub mod foundation;
pub mod presence;
