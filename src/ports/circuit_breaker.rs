//! CircuitBreaker port - fail fast on an unhealthy dependency.
//!
//! ```text
//! Closed --[failure_threshold consecutive failures, or failure ratio]--> Open
//! Open --[recovery_timeout]--> HalfOpen (one trial permit)
//! HalfOpen --[trial ok]--> Closed
//! HalfOpen --[trial fails]--> Open, cooldown restarts
//! ```

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    /// Calls are refused until `recovery_timeout` has passed.
    Open,
    /// One trial call is in flight or about to be.
    HalfOpen,
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit.
    ///
    /// Default: 5 failures
    pub failure_threshold: u32,

    /// Time to wait before allowing a trial call (moving to half-open).
    ///
    /// Default: 30 seconds
    pub recovery_timeout: Duration,

    /// Number of successful trials in half-open state needed to close.
    ///
    /// Default: 1
    pub success_threshold: u32,

    /// Maximum concurrent trial requests in half-open state.
    ///
    /// Default: 1 request at a time
    pub half_open_max_requests: u32,

    /// Rolling window for the failure-ratio rule.
    ///
    /// Default: None (ratio rule disabled, consecutive rule only)
    pub failure_window: Option<Duration>,

    /// Failure ratio within `failure_window` that opens the circuit.
    ///
    /// Default: 0.5
    pub failure_rate_threshold: f64,

    /// Minimum samples within the window before the ratio rule applies.
    ///
    /// Default: 10
    pub minimum_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
            half_open_max_requests: 1,
            failure_window: None,
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Config tuned for in-process event handlers.
    pub fn for_event_handler() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            failure_window: Some(Duration::from_secs(60)),
            failure_rate_threshold: 0.5,
            minimum_calls: 20,
            ..Default::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_failure_window(mut self, window: Duration, rate: f64, minimum_calls: u32) -> Self {
        self.failure_window = Some(window);
        self.failure_rate_threshold = rate;
        self.minimum_calls = minimum_calls;
        self
    }
}

/// A breaker guarding one target (a handler name, a store).
///
/// Callers ask [`should_allow`](Self::should_allow) before the call and
/// report its outcome afterwards; `call_guarded` in the resilience
/// adapters does both.
pub trait CircuitBreaker: Send + Sync {
    fn state(&self) -> CircuitState;

    /// `false` while open. Once the cooldown has elapsed the first caller
    /// moves the circuit to half-open and receives the only trial permit.
    fn should_allow(&self) -> bool;

    fn record_success(&self);

    /// Reopens immediately when half-open.
    fn record_failure(&self);

    /// Administrative override back to closed.
    fn reset(&self);

    fn metrics(&self) -> CircuitBreakerMetrics;
}

/// Counters since the breaker was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Calls refused while open or while the trial was out.
    pub total_rejections: u64,
    pub times_opened: u64,
    pub consecutive_failures: u32,
    /// Remaining cooldown, only while open.
    pub time_until_half_open: Option<Duration>,
}
