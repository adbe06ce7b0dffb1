//! Resilience primitives shared by the event bus and presence tracker.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{call_guarded, CallPermit, CircuitBreakerRegistry, InMemoryCircuitBreaker};
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy};
