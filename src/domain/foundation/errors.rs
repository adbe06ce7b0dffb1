//! Error types shared by every component.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A value failed its constructor's checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            ValidationError::EmptyField { field } | ValidationError::InvalidFormat { field, .. } => {
                field
            }
        }
    }
}

/// Machine-readable failure category, sent to clients in `ERROR` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,

    // Capacity and throttling
    CapacityExceeded,
    RateLimitExceeded,
    MaxCollaboratorsExceeded,

    // Registry misuse
    DuplicateSubscription,
    HandlerNotFound,
    ConnectionNotFound,

    // Resilience
    CircuitOpen,
    RetryExhausted,
    Timeout,

    Unauthorized,

    // Infrastructure
    StoreUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::CapacityExceeded => "CAPACITY_EXCEEDED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::MaxCollaboratorsExceeded => "MAX_COLLABORATORS_EXCEEDED",
            ErrorCode::DuplicateSubscription => "DUPLICATE_SUBSCRIPTION",
            ErrorCode::HandlerNotFound => "HANDLER_NOT_FOUND",
            ErrorCode::ConnectionNotFound => "CONNECTION_NOT_FOUND",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::RetryExhausted => "RETRY_EXHAUSTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-component error: a code, a human message and string details
/// (handler names, retry hints, targets).
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// A guarded call refused because `target`'s circuit is open.
    pub fn circuit_open(target: &str) -> Self {
        Self::new(ErrorCode::CircuitOpen, format!("Circuit open for '{}'", target))
            .with_detail("target", target)
    }

    /// `operation` missed its deadline.
    pub fn timeout(operation: &str, millis: u128) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("'{}' timed out after {}ms", operation, millis),
        )
        .with_detail("timeout_ms", millis.to_string())
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        let field = err.field().to_string();
        DomainError::new(ErrorCode::ValidationFailed, err.to_string()).with_detail("field", field)
    }
}
