//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the real-time core and the outside world. Adapters implement these ports.
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Port for publishing domain events
//! - `EventSubscriber` - Port for subscribing to domain events
//! - `EventHandler` - Handler that processes delivered events
//!
//! ## Resilience and Transport Ports
//!
//! - `CircuitBreaker` - Fail-fast guard around unhealthy dependencies
//! - `RateLimiter` - Per-IP admission and per-connection message limits
//! - `IdentityVerifier` - Upstream token validation at connection time
//!
//! ## Cross-node Ports
//!
//! - `PresenceStore` - Shared key-value + pub/sub store for presence

mod circuit_breaker;
mod event_publisher;
mod event_subscriber;
mod identity_verifier;
mod presence_store;
mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
pub use event_publisher::{EventPublisher, PublishReport};
pub use event_subscriber::{EventHandler, EventSubscriber};
pub use identity_verifier::{IdentityError, IdentityVerifier};
pub use presence_store::{ChannelMessages, PresenceStore, PresenceStoreError};
pub use rate_limiter::{
    Quota, RateDecision, RateLimitError, RateLimitKey, RateLimitScope, RateLimiter,
};
