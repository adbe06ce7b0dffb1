//! Event bus adapters.
//!
//! - `EventBus` - In-process publish/subscribe with retries, circuit
//!   breakers, timeouts and a dead-letter queue
//! - `AuditLogHandler` - Structured audit trail of domain events

mod audit_logger;
mod bus;
mod metrics;

pub use audit_logger::{AuditLogHandler, AUDITED_EVENT_TYPES};
pub use bus::{DeadLetter, EventBus, EventBusConfig};
pub use metrics::HandlerMetrics;
