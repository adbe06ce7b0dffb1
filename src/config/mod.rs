//! Application configuration
//!
//! Values come from `TASKFLOW__<SECTION>__<KEY>` environment variables
//! (and a `.env` file in development) through the `config` crate. Every
//! key has a default except `auth.jwt_secret`.
//!
//! ```no_run
//! use taskflow_realtime::config::AppConfig;
//!
//! let config = AppConfig::load().expect("configuration");
//! config.validate().expect("valid configuration");
//! ```

mod auth;
mod error;
mod realtime;
mod redis;
mod server;

pub use auth::AuthConfig;
pub use error::{ConfigError, ValidationError};
pub use realtime::{
    CollaborationSection, ConnectionsSection, EventBusSection, PresenceSection, RateLimitSection,
};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

const ENV_PREFIX: &str = "TASKFLOW";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub event_bus: EventBusSection,
    pub connections: ConnectionsSection,
    pub presence: PresenceSection,
    pub collaboration: CollaborationSection,
    pub rate_limit: RateLimitSection,
}

impl AppConfig {
    /// Read `.env` (if present) and the process environment.
    ///
    /// `TASKFLOW__CONNECTIONS__MAX_CONNECTIONS=20000` sets
    /// `connections.max_connections`.
    ///
    /// # Errors
    ///
    /// `ConfigError::Load` when a value cannot be parsed into its field.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let source = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR);

        Ok(config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?)
    }

    /// Check every section, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.auth.validate(self.server.environment)?;
        self.event_bus.validate()?;
        self.connections.validate()?;
        self.presence.validate()?;
        self.collaboration.validate()?;
        self.rate_limit.validate()
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
