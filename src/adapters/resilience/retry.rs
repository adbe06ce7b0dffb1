//! Bounded retry with exponential backoff.
//!
//! `max_retries` is the total number of invocations: a policy of 3 calls
//! the operation at most three times and sleeps twice.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry schedule for an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of invocations, including the first.
    pub max_retries: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per failed attempt.
    pub backoff_factor: f64,
    /// Draw each delay uniformly from `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that makes exactly one attempt.
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 1,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based).
    ///
    /// `min(base_delay * backoff_factor^(attempt - 1), max_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        if !capped.is_finite() || capped < 0.0 {
            return self.max_delay;
        }
        Duration::from_millis(capped as u64)
    }

    /// Delay actually slept after failed attempt `attempt`, jitter applied.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let floor = millis / 2;
        Duration::from_millis(rand::thread_rng().gen_range(floor..=millis))
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Result of a retried operation together with how many calls it took.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Runs async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry every error until the policy is exhausted.
    ///
    /// The last error is returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(operation_name, operation, |_| true).await.result
    }

    /// Retry only errors accepted by `is_retryable`.
    ///
    /// The closure receives the 0-based attempt number.
    pub async fn execute_if<T, E, F, Fut, P>(
        &self,
        operation_name: &str,
        mut operation: F,
        is_retryable: P,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            let result = operation(attempt).await;
            attempt += 1;

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    let delay = self.policy.jittered_delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        error = %e,
                        next_delay_ms = delay.as_millis() as u64,
                        "Attempt failed, will retry"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    debug!(operation = operation_name, attempt, error = %e, "Giving up");
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_base_delay(Duration::from_millis(10))
            .without_jitter()
    }

    #[test]
    fn delay_grows_exponentially_until_capped() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500))
            .without_jitter();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_runs_max_retries_times() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast_policy(3));

        let result: Result<(), String> = executor
            .execute("always_fails", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let executor = RetryExecutor::new(fast_policy(3));

        let outcome = executor
            .execute_if(
                "flaky",
                |attempt| async move {
                    if attempt < 2 {
                        Err(format!("fail {}", attempt))
                    } else {
                        Ok(attempt)
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let executor = RetryExecutor::new(fast_policy(5));

        let outcome: RetryOutcome<(), String> = executor
            .execute_if("fatal", |_| async { Err("fatal".to_string()) }, |e| e != "fatal")
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_retries_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(fast_policy(0));

        let _: Result<(), String> = executor
            .execute("once", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("no".to_string()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_max(
            base_ms in 1u64..10_000,
            max_ms in 1u64..60_000,
            factor in 1.0f64..10.0,
            attempt in 1u32..64,
            jitter in any::<bool>(),
        ) {
            let policy = RetryPolicy {
                max_retries: 64,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
                backoff_factor: factor,
                jitter,
            };
            prop_assert!(policy.jittered_delay_for(attempt) <= Duration::from_millis(max_ms));
        }

        #[test]
        fn jitter_stays_within_half_to_full_delay(base_ms in 2u64..5_000, attempt in 1u32..8) {
            let policy = RetryPolicy {
                max_retries: 8,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_secs(60),
                backoff_factor: 2.0,
                jitter: true,
            };
            let full = policy.delay_for(attempt);
            let jittered = policy.jittered_delay_for(attempt);
            prop_assert!(jittered <= full);
            prop_assert!(jittered >= full / 2 - Duration::from_millis(1));
        }
    }
}
