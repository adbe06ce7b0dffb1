//! Identity token settings

use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

const MIN_PRODUCTION_SECRET_BYTES: usize = 32;

/// HS256 secret shared with the upstream authentication service.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,

    /// Expected `iss` claim; not checked when unset
    pub jwt_issuer: Option<String>,
}

impl AuthConfig {
    /// Blank `jwt_issuer` counts as unset.
    pub fn issuer(&self) -> Option<&str> {
        self.jwt_issuer.as_deref().map(str::trim).filter(|iss| !iss.is_empty())
    }

    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        if self.jwt_secret.is_empty() {
            return Err(ValidationError::MissingRequired("auth.jwt_secret"));
        }
        if environment == Environment::Production
            && self.jwt_secret.len() < MIN_PRODUCTION_SECRET_BYTES
        {
            return Err(ValidationError::JwtSecretTooShort {
                min: MIN_PRODUCTION_SECRET_BYTES,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_issuer: None,
        }
    }

    #[test]
    fn secret_is_required() {
        assert_eq!(
            AuthConfig::default().validate(Environment::Development),
            Err(ValidationError::MissingRequired("auth.jwt_secret"))
        );
    }

    #[test]
    fn production_requires_a_long_secret() {
        let short = with_secret("dev");
        assert!(short.validate(Environment::Staging).is_ok());
        assert_eq!(
            short.validate(Environment::Production),
            Err(ValidationError::JwtSecretTooShort { min: 32 })
        );
        assert!(with_secret(&"x".repeat(48))
            .validate(Environment::Production)
            .is_ok());
    }

    #[test]
    fn blank_issuer_is_not_checked() {
        let mut config = with_secret("s");
        config.jwt_issuer = Some(" ".to_string());
        assert_eq!(config.issuer(), None);
        config.jwt_issuer = Some("taskflow-auth".to_string());
        assert_eq!(config.issuer(), Some("taskflow-auth"));
    }
}
