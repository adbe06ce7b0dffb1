//! Real-time core tuning: event bus, connections, presence, collaboration
//! and rate limits.
//!
//! Every field has a default, so a deployment only sets what it changes,
//! e.g. `TASKFLOW__CONNECTIONS__MAX_CONNECTIONS=20000`.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::collaboration::CollaborationConfig;
use crate::adapters::events::EventBusConfig;
use crate::adapters::presence::PresenceSettings;
use crate::adapters::rate_limiter::{RateLimitConfig, WindowLimit};
use crate::adapters::resilience::RetryPolicy;
use crate::adapters::websocket::ConnectionSettings;
use crate::ports::CircuitBreakerConfig;

fn out_of_range(field: &'static str, reason: &'static str) -> ValidationError {
    ValidationError::OutOfRange { field, reason }
}

/// Event bus section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventBusSection {
    pub max_in_flight: usize,
    pub delivery_timeout_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub stale_after_secs: u64,
    pub failure_ratio_cutoff: f64,
    pub min_executions: u64,
    pub janitor_interval_secs: u64,
    pub dead_letter_capacity: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_secs: u64,
}

impl Default for EventBusSection {
    fn default() -> Self {
        Self {
            max_in_flight: 1000,
            delivery_timeout_ms: 5000,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
            jitter: true,
            stale_after_secs: 3600,
            failure_ratio_cutoff: 0.9,
            min_executions: 20,
            janitor_interval_secs: 60,
            dead_letter_capacity: 1000,
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 30,
        }
    }
}

impl EventBusSection {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_in_flight == 0 {
            return Err(out_of_range("event_bus.max_in_flight", "must be positive"));
        }
        if self.delivery_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("event_bus.delivery_timeout_ms"));
        }
        if self.max_retries == 0 {
            return Err(out_of_range("event_bus.max_retries", "must allow at least one attempt"));
        }
        if self.backoff_factor < 1.0 {
            return Err(out_of_range("event_bus.backoff_factor", "must be at least 1.0"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(out_of_range("event_bus.base_delay_ms", "must not exceed max_delay_ms"));
        }
        if !(0.0..=1.0).contains(&self.failure_ratio_cutoff) {
            return Err(out_of_range("event_bus.failure_ratio_cutoff", "must be within 0.0..=1.0"));
        }
        if self.janitor_interval_secs == 0 {
            return Err(out_of_range("event_bus.janitor_interval_secs", "must be positive"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
        }
    }

    pub fn to_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            max_in_flight: self.max_in_flight,
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
            retry: self.retry_policy(),
            stale_after: Duration::from_secs(self.stale_after_secs),
            failure_ratio_cutoff: self.failure_ratio_cutoff,
            min_executions: self.min_executions,
            janitor_interval: Duration::from_secs(self.janitor_interval_secs),
            dead_letter_capacity: self.dead_letter_capacity,
            circuit_breaker: CircuitBreakerConfig::for_event_handler()
                .with_failure_threshold(self.breaker_failure_threshold)
                .with_recovery_timeout(Duration::from_secs(self.breaker_recovery_secs)),
        }
    }
}

/// WebSocket connections section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionsSection {
    pub max_connections: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub send_timeout_ms: u64,
    pub outbound_buffer: usize,
}

impl Default for ConnectionsSection {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_timeout_ms: 5000,
            outbound_buffer: 256,
        }
    }
}

impl ConnectionsSection {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_connections == 0 {
            return Err(out_of_range("connections.max_connections", "must be positive"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::InvalidTimeout("connections.heartbeat_interval_secs"));
        }
        if self.heartbeat_timeout_secs <= self.heartbeat_interval_secs {
            return Err(out_of_range(
                "connections.heartbeat_timeout_secs",
                "must exceed heartbeat_interval_secs",
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("connections.send_timeout_ms"));
        }
        if self.outbound_buffer == 0 {
            return Err(out_of_range("connections.outbound_buffer", "must be positive"));
        }
        Ok(())
    }

    pub fn to_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            max_connections: self.max_connections,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            outbound_buffer: self.outbound_buffer,
        }
    }
}

/// Presence section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceSection {
    pub ttl_secs: u64,
    pub cache_capacity: usize,
    pub cleanup_interval_secs: u64,
    pub store_timeout_ms: u64,
    pub channel: String,
    pub key_prefix: String,
}

impl Default for PresenceSection {
    fn default() -> Self {
        let defaults = PresenceSettings::default();
        Self {
            ttl_secs: defaults.ttl.as_secs(),
            cache_capacity: defaults.cache_capacity,
            cleanup_interval_secs: defaults.cleanup_interval.as_secs(),
            store_timeout_ms: defaults.store_timeout.as_millis() as u64,
            channel: defaults.channel,
            key_prefix: defaults.key_prefix,
        }
    }
}

impl PresenceSection {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ttl_secs == 0 {
            return Err(out_of_range("presence.ttl_secs", "must be positive"));
        }
        if self.cache_capacity == 0 {
            return Err(out_of_range("presence.cache_capacity", "must be positive"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(out_of_range("presence.cleanup_interval_secs", "must be positive"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("presence.store_timeout_ms"));
        }
        if self.channel.is_empty() {
            return Err(ValidationError::MissingRequired("presence.channel"));
        }
        Ok(())
    }

    pub fn to_settings(&self) -> PresenceSettings {
        PresenceSettings {
            ttl: Duration::from_secs(self.ttl_secs),
            cache_capacity: self.cache_capacity,
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            channel: self.channel.clone(),
            key_prefix: self.key_prefix.clone(),
            ..PresenceSettings::default()
        }
    }
}

/// Collaboration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaborationSection {
    pub max_collaborators_per_resource: usize,
    pub sweep_interval_secs: u64,
}

impl Default for CollaborationSection {
    fn default() -> Self {
        Self {
            max_collaborators_per_resource: 10,
            sweep_interval_secs: 60,
        }
    }
}

impl CollaborationSection {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_collaborators_per_resource == 0 {
            return Err(out_of_range(
                "collaboration.max_collaborators_per_resource",
                "must be positive",
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(out_of_range("collaboration.sweep_interval_secs", "must be positive"));
        }
        Ok(())
    }

    pub fn to_config(&self) -> CollaborationConfig {
        CollaborationConfig {
            max_collaborators_per_resource: self.max_collaborators_per_resource,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

/// Rate limit section; every quota uses the same window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub window_secs: u32,
    pub global_requests: u32,
    pub per_ip_requests: u32,
    pub per_connection_requests: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            window_secs: defaults.global.window_secs,
            global_requests: defaults.global.requests,
            per_ip_requests: defaults.per_ip.requests,
            per_connection_requests: defaults.per_connection.requests,
        }
    }
}

impl RateLimitSection {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.window_secs == 0 {
            return Err(out_of_range("rate_limit.window_secs", "must be positive"));
        }
        if self.global_requests == 0 || self.per_ip_requests == 0 || self.per_connection_requests == 0 {
            return Err(out_of_range("rate_limit", "every quota must be positive"));
        }
        Ok(())
    }

    pub fn to_config(&self) -> RateLimitConfig {
        let limit = |requests| WindowLimit {
            requests,
            window_secs: self.window_secs,
        };
        RateLimitConfig {
            global: limit(self.global_requests),
            per_ip: limit(self.per_ip_requests),
            per_connection: limit(self.per_connection_requests),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_and_match_adapter_defaults() {
        let bus = EventBusSection::default();
        assert!(bus.validate().is_ok());
        let converted = bus.to_bus_config();
        assert_eq!(converted.max_in_flight, EventBusConfig::default().max_in_flight);
        assert_eq!(converted.retry.max_retries, 3);

        assert!(ConnectionsSection::default().validate().is_ok());
        assert!(PresenceSection::default().validate().is_ok());
        assert!(CollaborationSection::default().validate().is_ok());
        assert!(RateLimitSection::default().validate().is_ok());
        assert_eq!(RateLimitSection::default().to_config(), RateLimitConfig::default());
    }

    #[test]
    fn heartbeat_timeout_must_exceed_interval() {
        let section = ConnectionsSection {
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 30,
            ..Default::default()
        };
        assert!(matches!(
            section.validate(),
            Err(ValidationError::OutOfRange { field: "connections.heartbeat_timeout_secs", .. })
        ));
    }

    #[test]
    fn zero_attempt_budget_is_rejected() {
        let section = EventBusSection {
            max_retries: 0,
            ..Default::default()
        };
        assert!(section.validate().is_err());
    }

    #[test]
    fn presence_section_converts_durations() {
        let section = PresenceSection {
            ttl_secs: 120,
            store_timeout_ms: 750,
            ..Default::default()
        };
        let settings = section.to_settings();
        assert_eq!(settings.ttl, Duration::from_secs(120));
        assert_eq!(settings.store_timeout, Duration::from_millis(750));
        assert_eq!(settings.channel, "presence:changes");
    }

    #[test]
    fn collaboration_limit_must_be_positive() {
        let section = CollaborationSection {
            max_collaborators_per_resource: 0,
            ..Default::default()
        };
        assert!(section.validate().is_err());
    }
}
