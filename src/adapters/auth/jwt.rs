//! HS256 JWT adapter for the `IdentityVerifier` port.
//!
//! Tokens are minted by the upstream authentication service with a shared
//! secret. This adapter checks:
//! - **Signature**: HS256 with the shared secret
//! - **Expiry (exp)**: Must be in the future
//! - **Issuer (iss)**: Must match when an issuer is configured
//!
//! The `sub` claim becomes the connection's `UserId`.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::UserId;
use crate::ports::{IdentityError, IdentityVerifier};

/// JWT claims this service relies on.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user ID
    pub sub: String,

    /// Expiry timestamp (Unix epoch seconds)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

pub struct JwtIdentityVerifier {
    secret: SecretString,
    issuer: Option<String>,
}

impl JwtIdentityVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
            issuer: None,
        }
    }

    /// Require tokens to carry this `iss` claim.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into()).filter(|i: &String| !i.is_empty());
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, IdentityError> {
        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        decode::<Claims>(token, &key, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("Token expired");
                    IdentityError::Expired
                }
                ErrorKind::InvalidIssuer => {
                    tracing::warn!("Invalid issuer in token");
                    IdentityError::InvalidToken("issuer mismatch".to_string())
                }
                _ => {
                    tracing::debug!("Token rejected: {}", e);
                    IdentityError::InvalidToken(e.to_string())
                }
            })
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::MissingToken);
        }
        let claims = self.decode_claims(token)?;
        UserId::new(claims.sub).map_err(|e| IdentityError::InvalidToken(e.to_string()))
    }
}
