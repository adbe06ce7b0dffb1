//! In-process event bus.
//!
//! Handlers are registered per `EventType` and run concurrently for each
//! publish. Every attempt is guarded by the handler's circuit breaker and
//! a priority-dependent timeout; HIGH priority events are retried with
//! exponential backoff. Failures that exhaust their attempts are reported
//! back to the publisher in one aggregated error and kept in a bounded
//! dead-letter queue.
//!
//! # Example
//!
//! ```ignore
//! let bus = Arc::new(EventBus::new(EventBusConfig::default()));
//! bus.subscribe(EventType::TaskUpdated, Arc::new(AuditLogHandler::new()))?;
//!
//! bus.publish(EventType::TaskUpdated, json!({"taskId": "t-1"}), PublishOptions::high_priority())
//!     .await?;
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::metrics::{HandlerMetrics, HandlerStats};
use crate::adapters::resilience::{
    CallPermit, CircuitBreakerRegistry, InMemoryCircuitBreaker, RetryExecutor, RetryPolicy,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, Event, EventType, Priority, PublishOptions, Timestamp,
};
use crate::ports::{
    CircuitBreakerConfig, EventHandler, EventPublisher, EventSubscriber,
    PublishReport,
};

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Ceiling on events being delivered at once.
    pub max_in_flight: usize,

    /// Per-attempt timeout for MEDIUM priority. HIGH gets double, LOW half.
    pub delivery_timeout: Duration,

    /// Backoff schedule; `max_retries` is the default attempt budget.
    pub retry: RetryPolicy,

    /// Handlers that keep receiving events without handling one
    /// successfully for this long are evicted. Idle handlers are kept.
    pub stale_after: Duration,

    /// Failure ratio above which a handler is evicted.
    pub failure_ratio_cutoff: f64,

    /// Attempts required before the failure ratio is considered.
    pub min_executions: u64,

    /// How often the janitor runs.
    pub janitor_interval: Duration,

    /// Maximum dead letters retained; oldest are dropped first.
    pub dead_letter_capacity: usize,

    /// Settings for the per-handler circuit breakers.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 1000,
            delivery_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            stale_after: Duration::from_secs(3600),
            failure_ratio_cutoff: 0.9,
            min_executions: 20,
            janitor_interval: Duration::from_secs(60),
            dead_letter_capacity: 1000,
            circuit_breaker: CircuitBreakerConfig::for_event_handler(),
        }
    }
}

impl EventBusConfig {
    /// Per-attempt timeout for an event of the given priority.
    pub fn attempt_timeout(&self, priority: Priority) -> Duration {
        match priority {
            Priority::High => self.delivery_timeout.saturating_mul(2),
            Priority::Medium => self.delivery_timeout,
            Priority::Low => self.delivery_timeout / 2,
        }
    }
}

/// A delivery that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event: Event,
    pub handler: String,
    pub error: DomainError,
    pub attempts: u32,
    pub failed_at: Timestamp,
}

/// Failure of one handler for one event.
struct DeliveryFailure {
    handler: &'static str,
    error: DomainError,
    attempts: u32,
}

/// Releases an in-flight slot on drop.
struct InFlightSlot<'a>(&'a AtomicUsize);

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Publish/subscribe registry over [`EventType`].
pub struct EventBus {
    config: EventBusConfig,
    handlers: RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    stats: DashMap<&'static str, Mutex<HandlerStats>>,
    breakers: CircuitBreakerRegistry,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    in_flight: AtomicUsize,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker.clone());
        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            stats: DashMap::new(),
            breakers,
            dead_letters: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Events currently being delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Names of the handlers subscribed to `event_type`, in registration order.
    pub fn handlers_for(&self, event_type: EventType) -> Vec<&'static str> {
        self.handlers
            .read()
            .get(&event_type)
            .map(|list| list.iter().map(|h| h.name()).collect())
            .unwrap_or_default()
    }

    /// Total number of (event type, handler) subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Execution metrics for a handler identity.
    pub fn handler_metrics(&self, handler_name: &str) -> Result<HandlerMetrics, DomainError> {
        self.stats
            .get(handler_name)
            .map(|stats| stats.lock().snapshot())
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::HandlerNotFound,
                    format!("No handler named '{}' is subscribed", handler_name),
                )
                .with_detail("handler", handler_name)
            })
    }

    /// Circuit breaker state for a handler, if it has one yet.
    pub fn handler_circuit(&self, handler_name: &str) -> Option<Arc<InMemoryCircuitBreaker>> {
        self.stats
            .contains_key(handler_name)
            .then(|| self.breakers.get(handler_name))
    }

    /// Copy of the dead-letter queue, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().iter().cloned().collect()
    }

    fn snapshot_handlers(&self, event_type: EventType) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .get(&event_type)
            .cloned()
            .unwrap_or_default()
    }

    fn try_acquire_slot(&self) -> Option<InFlightSlot<'_>> {
        let max = self.config.max_in_flight;
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| InFlightSlot(&self.in_flight))
    }

    fn record_offer(&self, handler_name: &'static str) {
        if let Some(stats) = self.stats.get(handler_name) {
            stats.lock().offered();
        }
    }

    fn record_attempt(&self, handler_name: &'static str, succeeded: bool, latency: Duration) {
        if let Some(stats) = self.stats.get(handler_name) {
            stats.lock().record(succeeded, latency);
        }
    }

    fn push_dead_letter(&self, event: &Event, failure: &DeliveryFailure) {
        if self.config.dead_letter_capacity == 0 {
            return;
        }
        let mut queue = self.dead_letters.lock();
        while queue.len() >= self.config.dead_letter_capacity {
            queue.pop_front();
        }
        queue.push_back(DeadLetter {
            event: event.clone(),
            handler: failure.handler.to_string(),
            error: failure.error.clone(),
            attempts: failure.attempts,
            failed_at: Timestamp::now(),
        });
    }

    /// One guarded, timed invocation of a handler.
    async fn attempt(
        &self,
        handler: Arc<dyn EventHandler>,
        breaker: Arc<InMemoryCircuitBreaker>,
        event: Event,
        timeout: Duration,
    ) -> Result<(), DomainError> {
        let name = handler.name();
        self.record_offer(name);
        let Some(permit) = CallPermit::acquire(&*breaker) else {
            debug!(handler = name, event_id = %event.id, "Circuit open, skipping handler");
            return Err(DomainError::circuit_open(name));
        };

        let started = Instant::now();
        let result = match time::timeout(timeout, handler.handle(event)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::timeout(name, timeout.as_millis())),
        };
        let latency = started.elapsed();

        permit.settle(&result);
        self.record_attempt(name, result.is_ok(), latency);
        result
    }

    /// Deliver one event to one handler under its retry budget.
    async fn deliver(
        &self,
        event: &Event,
        handler: Arc<dyn EventHandler>,
        timeout: Duration,
    ) -> Result<(), DeliveryFailure> {
        let name = handler.name();
        let breaker = self.breakers.get(name);
        let policy = self
            .config
            .retry
            .clone()
            .with_max_retries(event.metadata.attempt_budget());

        let outcome = RetryExecutor::new(policy)
            .execute_if(
                name,
                |attempt| {
                    self.attempt(
                        Arc::clone(&handler),
                        Arc::clone(&breaker),
                        event.for_attempt(attempt),
                        timeout,
                    )
                },
                |e: &DomainError| !e.is(ErrorCode::CircuitOpen),
            )
            .await;

        outcome.result.map_err(|error| DeliveryFailure {
            handler: name,
            error,
            attempts: outcome.attempts,
        })
    }

    fn aggregate_failures(event: &Event, failures: &[DeliveryFailure]) -> DomainError {
        let names: Vec<&str> = failures.iter().map(|f| f.handler).collect();
        let all_rejected = failures.iter().all(|f| f.error.is(ErrorCode::CircuitOpen));
        let (code, message) = if all_rejected {
            (
                ErrorCode::CircuitOpen,
                format!("Circuit open for handlers: {}", names.join(", ")),
            )
        } else {
            (
                ErrorCode::RetryExhausted,
                format!(
                    "Delivery of {} failed for handlers: {}",
                    event.event_type,
                    names.join(", ")
                ),
            )
        };
        DomainError::new(code, message)
            .with_detail("handlers", names.join(","))
            .with_detail("event_id", event.id.as_str())
            .with_detail("event_type", event.event_type.as_str())
    }

    /// Remove handlers that are stale or failing too often.
    ///
    /// Returns the evicted handler names.
    pub fn evict_unhealthy(&self) -> Vec<&'static str> {
        let now = Instant::now();
        let evicted: Vec<&'static str> = self
            .stats
            .iter()
            .filter(|entry| {
                let stats = entry.value().lock();
                stats.is_stale(now, self.config.stale_after)
                    || stats.is_unhealthy(self.config.failure_ratio_cutoff, self.config.min_executions)
            })
            .map(|entry| *entry.key())
            .collect();

        if evicted.is_empty() {
            return evicted;
        }

        {
            let mut handlers = self.handlers.write();
            for list in handlers.values_mut() {
                list.retain(|h| !evicted.contains(&h.name()));
            }
            handlers.retain(|_, list| !list.is_empty());
        }
        for name in &evicted {
            self.stats.remove(*name);
            self.breakers.remove(name);
            warn!(handler = *name, "Evicted unhealthy event handler");
        }
        evicted
    }

    /// Periodically evict unhealthy handlers until shutdown is signalled.
    pub async fn run_janitor(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.janitor_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Event bus janitor stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    let evicted = self.evict_unhealthy();
                    if !evicted.is_empty() {
                        info!(count = evicted.len(), "Janitor evicted handlers");
                    }
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(
        &self,
        event_type: EventType,
        data: JsonValue,
        options: PublishOptions,
    ) -> Result<PublishReport, DomainError> {
        let handlers = self.snapshot_handlers(event_type);
        let event = Event::from_options(event_type, data, &options, self.config.retry.max_retries);
        let mut report = PublishReport {
            event_id: event.id.clone(),
            event_type,
            handlers_invoked: 0,
        };

        if handlers.is_empty() {
            debug!(event_type = %event_type, "No handlers subscribed, skipping");
            return Ok(report);
        }

        let _slot = self.try_acquire_slot().ok_or_else(|| {
            warn!(event_type = %event_type, max_in_flight = self.config.max_in_flight, "Event bus at capacity");
            DomainError::new(
                ErrorCode::CapacityExceeded,
                format!(
                    "Event bus is delivering {} events already",
                    self.config.max_in_flight
                ),
            )
            .with_detail("limit", self.config.max_in_flight.to_string())
        })?;

        let timeout = self.config.attempt_timeout(event.metadata.priority);
        debug!(
            event_id = %event.id,
            event_type = %event_type,
            handlers = handlers.len(),
            "Publishing event"
        );

        let results = join_all(
            handlers
                .iter()
                .map(|handler| self.deliver(&event, Arc::clone(handler), timeout)),
        )
        .await;
        report.handlers_invoked = handlers.len();

        let failures: Vec<DeliveryFailure> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            return Ok(report);
        }

        for failure in &failures {
            error!(
                event_id = %event.id,
                event_type = %event_type,
                handler = failure.handler,
                attempts = failure.attempts,
                error = %failure.error,
                "Event delivery failed"
            );
            self.push_dead_letter(&event, failure);
        }
        Err(Self::aggregate_failures(&event, &failures))
    }
}

impl EventSubscriber for EventBus {
    fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), DomainError> {
        let name = handler.name();
        let mut handlers = self.handlers.write();
        let list = handlers.entry(event_type).or_default();
        if list.iter().any(|h| h.name() == name) {
            return Err(DomainError::new(
                ErrorCode::DuplicateSubscription,
                format!("Handler '{}' is already subscribed to {}", name, event_type),
            )
            .with_detail("handler", name)
            .with_detail("event_type", event_type.as_str()));
        }
        list.push(handler);
        self.stats
            .entry(name)
            .or_insert_with(|| Mutex::new(HandlerStats::new()));
        debug!(handler = name, event_type = %event_type, "Handler subscribed");
        Ok(())
    }

    fn unsubscribe(&self, event_type: EventType, handler_name: &str) {
        let mut handlers = self.handlers.write();
        if let Some(list) = handlers.get_mut(&event_type) {
            list.retain(|h| h.name() != handler_name);
            if list.is_empty() {
                handlers.remove(&event_type);
            }
        }
        let still_subscribed = handlers
            .values()
            .any(|list| list.iter().any(|h| h.name() == handler_name));
        drop(handlers);

        if !still_subscribed {
            self.stats.remove(handler_name);
            self.breakers.remove(handler_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    struct CountingHandler {
        name: &'static str,
        calls: AtomicU32,
        fail_first: u32,
    }

    impl CountingHandler {
        fn new(name: &'static str, fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicU32::new(0),
                fail_first,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: Event) -> Result<(), DomainError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(DomainError::new(ErrorCode::InternalError, "handler failed"))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl EventHandler for SlowHandler {
        async fn handle(&self, _event: Event) -> Result<(), DomainError> {
            time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn test_bus() -> EventBus {
        EventBus::new(EventBusConfig {
            retry: RetryPolicy::default()
                .with_base_delay(Duration::from_millis(10))
                .without_jitter(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn publish_without_handlers_is_ok() {
        let bus = test_bus();
        let report = bus
            .publish(EventType::TaskCreated, json!({}), PublishOptions::default())
            .await
            .unwrap();
        assert_eq!(report.handlers_invoked, 0);
        assert_eq!(bus.in_flight(), 0);
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let bus = test_bus();
        let handler = CountingHandler::new("dup", 0);
        bus.subscribe(EventType::TaskCreated, handler.clone()).unwrap();

        let err = bus.subscribe(EventType::TaskCreated, handler.clone()).unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateSubscription);

        // Same handler on another type is fine
        bus.subscribe(EventType::TaskDeleted, handler).unwrap();
        assert_eq!(bus.subscription_count(), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = test_bus();
        bus.subscribe(EventType::TaskCreated, CountingHandler::new("h", 0))
            .unwrap();
        bus.unsubscribe(EventType::TaskCreated, "h");
        bus.unsubscribe(EventType::TaskCreated, "h");
        assert!(bus.handlers_for(EventType::TaskCreated).is_empty());
        assert_eq!(
            bus.handler_metrics("h").unwrap_err().code,
            ErrorCode::HandlerNotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn high_priority_retries_until_success() {
        let bus = test_bus();
        let handler = CountingHandler::new("flaky", 2);
        bus.subscribe(EventType::TaskUpdated, handler.clone()).unwrap();

        let report = bus
            .publish(EventType::TaskUpdated, json!({"taskId": "t-1"}), PublishOptions::high_priority())
            .await
            .unwrap();

        assert_eq!(report.handlers_invoked, 1);
        assert_eq!(handler.calls(), 3);
        let metrics = bus.handler_metrics("flaky").unwrap();
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn medium_priority_gets_single_attempt() {
        let bus = test_bus();
        let handler = CountingHandler::new("once", 5);
        bus.subscribe(EventType::CommentAdded, handler.clone()).unwrap();

        let err = bus
            .publish(EventType::CommentAdded, json!({}), PublishOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::RetryExhausted);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_aggregated_and_dead_lettered() {
        let bus = test_bus();
        let good = CountingHandler::new("good", 0);
        let bad = CountingHandler::new("bad", u32::MAX);
        bus.subscribe(EventType::TaskDeleted, good.clone()).unwrap();
        bus.subscribe(EventType::TaskDeleted, bad.clone()).unwrap();

        let err = bus
            .publish(EventType::TaskDeleted, json!({}), PublishOptions::high_priority())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::RetryExhausted);
        assert_eq!(err.details.get("handlers").map(String::as_str), Some("bad"));
        assert_eq!(good.calls(), 1);
        assert_eq!(bad.calls(), 3);

        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].handler, "bad");
        assert_eq!(dead[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let bus = test_bus();
        bus.subscribe(EventType::TaskCreated, Arc::new(SlowHandler)).unwrap();

        let err = bus
            .publish(
                EventType::TaskCreated,
                json!({}),
                PublishOptions::default().with_priority(Priority::Low),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::RetryExhausted);
        assert_eq!(bus.dead_letters()[0].error.code, ErrorCode::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_rejects_without_invoking_handler() {
        let bus = EventBus::new(EventBusConfig {
            circuit_breaker: CircuitBreakerConfig::default().with_failure_threshold(1),
            ..Default::default()
        });
        let handler = CountingHandler::new("fragile", u32::MAX);
        bus.subscribe(EventType::ProjectUpdated, handler.clone()).unwrap();

        let first = bus
            .publish(EventType::ProjectUpdated, json!({}), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(first.code, ErrorCode::RetryExhausted);

        let second = bus
            .publish(EventType::ProjectUpdated, json!({}), PublishOptions::high_priority())
            .await
            .unwrap_err();
        assert_eq!(second.code, ErrorCode::CircuitOpen);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn capacity_exceeded_when_no_slots() {
        let bus = EventBus::new(EventBusConfig {
            max_in_flight: 0,
            ..Default::default()
        });
        bus.subscribe(EventType::TaskCreated, CountingHandler::new("h", 0))
            .unwrap();

        let err = bus
            .publish(EventType::TaskCreated, json!({}), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CapacityExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_evicts_stale_and_failing_handlers() {
        let bus = EventBus::new(EventBusConfig {
            stale_after: Duration::from_secs(60),
            min_executions: 2,
            failure_ratio_cutoff: 0.5,
            circuit_breaker: CircuitBreakerConfig::default().with_failure_threshold(100),
            ..Default::default()
        });
        let failing = CountingHandler::new("failing", u32::MAX);
        let healthy = CountingHandler::new("healthy", 0);
        bus.subscribe(EventType::TaskCreated, failing).unwrap();
        bus.subscribe(EventType::TaskCreated, healthy).unwrap();

        for _ in 0..2 {
            let _ = bus
                .publish(EventType::TaskCreated, json!({}), PublishOptions::default())
                .await;
        }

        assert_eq!(bus.evict_unhealthy(), vec!["failing"]);
        assert_eq!(bus.handlers_for(EventType::TaskCreated), vec!["healthy"]);

        time::advance(Duration::from_secs(61)).await;
        assert!(bus.evict_unhealthy().is_empty());
        assert_eq!(bus.subscription_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_hour_keeps_healthy_handlers() {
        let bus = test_bus();
        bus.subscribe(EventType::TaskUpdated, CountingHandler::new("websocket_broadcast", 0))
            .unwrap();

        time::advance(Duration::from_secs(3601)).await;

        assert!(bus.evict_unhealthy().is_empty());
        assert_eq!(bus.handlers_for(EventType::TaskUpdated), vec!["websocket_broadcast"]);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_refused_by_its_circuit_goes_stale() {
        let bus = EventBus::new(EventBusConfig {
            stale_after: Duration::from_secs(60),
            circuit_breaker: CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_recovery_timeout(Duration::from_secs(3600)),
            ..Default::default()
        });
        bus.subscribe(EventType::TaskCreated, CountingHandler::new("broken", u32::MAX))
            .unwrap();
        let _ = bus
            .publish(EventType::TaskCreated, json!({}), PublishOptions::default())
            .await;

        time::advance(Duration::from_secs(61)).await;
        let _ = bus
            .publish(EventType::TaskCreated, json!({}), PublishOptions::default())
            .await;

        assert_eq!(bus.evict_unhealthy(), vec!["broken"]);
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_loop_stops_on_shutdown() {
        let bus = Arc::new(test_bus());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn({
            let bus = Arc::clone(&bus);
            async move { bus.run_janitor(rx).await }
        });

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn attempt_timeout_scales_with_priority() {
        let config = EventBusConfig::default();
        assert_eq!(config.attempt_timeout(Priority::High), Duration::from_secs(10));
        assert_eq!(config.attempt_timeout(Priority::Medium), Duration::from_secs(5));
        assert_eq!(config.attempt_timeout(Priority::Low), Duration::from_millis(2500));
    }
}
