//! In-memory circuit breaker and a registry keyed by target name.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::foundation::DomainError;
use crate::ports::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
    /// (when, succeeded) samples inside the failure window.
    samples: VecDeque<(Instant, bool)>,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    times_opened: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            opened_at: None,
            samples: VecDeque::new(),
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
            times_opened: 0,
        }
    }
}

/// Circuit breaker guarding a single named target.
#[derive(Debug)]
pub struct InMemoryCircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl InMemoryCircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, inner: &mut BreakerState, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.half_open_in_flight = 0;
        inner.half_open_successes = 0;
        inner.times_opened += 1;
        warn!(target_name = %self.name, times_opened = inner.times_opened, "Circuit opened");
    }

    fn close(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.consecutive_failures = 0;
        inner.half_open_in_flight = 0;
        inner.half_open_successes = 0;
        inner.samples.clear();
        info!(target_name = %self.name, "Circuit closed");
    }

    fn cooldown_elapsed(&self, inner: &BreakerState, now: Instant) -> bool {
        inner
            .opened_at
            .map(|opened| now.duration_since(opened) >= self.config.recovery_timeout)
            .unwrap_or(true)
    }

    fn record_sample(&self, inner: &mut BreakerState, now: Instant, success: bool) {
        let Some(window) = self.config.failure_window else {
            return;
        };
        inner.samples.push_back((now, success));
        while let Some((at, _)) = inner.samples.front() {
            if now.duration_since(*at) > window {
                inner.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn failure_rate_exceeded(&self, inner: &BreakerState) -> bool {
        if self.config.failure_window.is_none() {
            return false;
        }
        let total = inner.samples.len();
        if total == 0 || (total as u32) < self.config.minimum_calls {
            return false;
        }
        let failures = inner.samples.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / total as f64 >= self.config.failure_rate_threshold
    }
}

impl CircuitBreaker for InMemoryCircuitBreaker {
    fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn should_allow(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.cooldown_elapsed(&inner, now) {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    inner.half_open_successes = 0;
                    info!(target_name = %self.name, "Circuit half-open, allowing trial call");
                    true
                } else {
                    inner.total_rejections += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_requests {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    inner.total_rejections += 1;
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.total_successes += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                self.record_sample(&mut inner, now, true);
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    self.close(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                self.record_sample(&mut inner, now, false);
                if inner.consecutive_failures >= self.config.failure_threshold
                    || self.failure_rate_exceeded(&inner)
                {
                    self.open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => self.open(&mut inner, now),
            CircuitState::Open => {}
        }
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        self.close(&mut inner);
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let now = Instant::now();
        let inner = self.inner.lock();
        let time_until_half_open = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened)) => Some(
                self.config
                    .recovery_timeout
                    .saturating_sub(now.duration_since(opened)),
            ),
            _ => None,
        };
        CircuitBreakerMetrics {
            state: inner.state,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            times_opened: inner.times_opened,
            consecutive_failures: inner.consecutive_failures,
            time_until_half_open,
        }
    }
}

/// Admission granted by a breaker, settled by reporting the outcome.
///
/// A permit dropped without [`succeeded`](Self::succeeded) or
/// [`failed`](Self::failed), for instance because the caller's future was
/// cancelled mid-call, counts as a failure. A half-open trial therefore
/// always resolves, reopening the circuit with a fresh cooldown.
#[must_use = "an unsettled permit is recorded as a failure"]
pub struct CallPermit<'a> {
    breaker: &'a dyn CircuitBreaker,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    /// `None` when the breaker refuses the call.
    pub fn acquire(breaker: &'a dyn CircuitBreaker) -> Option<Self> {
        breaker.should_allow().then_some(Self {
            breaker,
            settled: false,
        })
    }

    pub fn succeeded(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }

    pub fn settle<T, E>(self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.succeeded(),
            Err(_) => self.failed(),
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Guarded call abandoned before completing, recording failure");
            self.breaker.record_failure();
        }
    }
}

/// Run `operation` through `breaker`.
///
/// Rejected calls fail with `CircuitOpen` without polling the future.
pub async fn call_guarded<T, Fut>(
    breaker: &dyn CircuitBreaker,
    target: &str,
    operation: Fut,
) -> Result<T, DomainError>
where
    Fut: Future<Output = Result<T, DomainError>>,
{
    let Some(permit) = CallPermit::acquire(breaker) else {
        return Err(DomainError::circuit_open(target));
    };
    let result = operation.await;
    permit.settle(&result);
    result
}

/// Lazily created breakers, one per target name.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<InMemoryCircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `target`, created on first use.
    pub fn get(&self, target: &str) -> Arc<InMemoryCircuitBreaker> {
        if let Some(existing) = self.breakers.get(target) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .breakers
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(InMemoryCircuitBreaker::new(target, self.config.clone())));
        Arc::clone(entry.value())
    }

    pub fn metrics(&self, target: &str) -> Option<CircuitBreakerMetrics> {
        self.breakers.get(target).map(|b| b.metrics())
    }

    pub fn reset(&self, target: &str) -> bool {
        match self.breakers.get(target) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, target: &str) {
        self.breakers.remove(target);
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
