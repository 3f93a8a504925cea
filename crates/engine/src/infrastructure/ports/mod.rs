//! Port traits for infrastructure boundaries.
//!
//! The lobby core depends on one external collaborator: whoever decides that
//! an auth token belongs to a player. Everything else is concrete types.

use async_trait::async_trait;

use gamelobby_domain::PlayerIdentity;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Malformed token: {0}")]
    MalformedToken(String),
    #[error("Authentication unavailable: {0}")]
    Unavailable(String),
}

/// Turns a handshake token into a validated identity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<PlayerIdentity, AuthError>;
}
