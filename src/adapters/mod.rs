//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to the outside world:
//! - `resilience` - Retry executor and circuit breakers
//! - `events` - In-process event bus and audit handler
//! - `rate_limiter` - Fixed-window limiter for admissions and frames
//! - `presence` - Presence tracker and its shared stores (in-memory, Redis)
//! - `collaboration` - Per-resource collaborator coordination
//! - `websocket` - Connection manager, transport and event bridge
//! - `auth` - Identity token verification
//! - `http` - Router and health endpoint

pub mod auth;
pub mod collaboration;
pub mod events;
pub mod http;
pub mod presence;
pub mod rate_limiter;
pub mod resilience;
pub mod websocket;

pub use events::{EventBus, EventBusConfig};
