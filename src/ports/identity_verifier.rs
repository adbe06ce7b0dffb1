//! IdentityVerifier port - validates the upstream identity token
//! presented when a WebSocket connection is opened.

use async_trait::async_trait;

use crate::domain::foundation::UserId;

/// Reasons a token can be refused.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("missing identity token")]
    MissingToken,

    #[error("invalid identity token: {0}")]
    InvalidToken(String),

    #[error("identity token expired")]
    Expired,
}

/// Port implemented by the external authentication collaborator.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolve a bearer token to the user it identifies.
    async fn verify(&self, token: &str) -> Result<UserId, IdentityError>;
}
