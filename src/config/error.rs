//! Configuration errors

use thiserror::Error;

/// Loading or validating [`super::AppConfig`] failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

/// A loaded value is unusable. Fields are named by their dotted key,
/// `TASKFLOW__SERVER__PORT` being `server.port`.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{0} must be set")]
    MissingRequired(&'static str),

    #[error("server.port cannot be 0")]
    InvalidPort,

    #[error("redis.url is not a Redis URL: {0}")]
    InvalidRedisUrl(String),

    #[error("{0} must be a positive duration")]
    InvalidTimeout(&'static str),

    #[error("auth.jwt_secret must be at least {min} bytes in production")]
    JwtSecretTooShort { min: usize },

    #[error("{field} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
}
