//! Player identity as handed over by the authentication collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;
use crate::value_objects::DisplayName;

/// Maximum length of an opaque player identifier
const MAX_PLAYER_ID_LENGTH: usize = 64;

/// Opaque, stable player identifier.
///
/// The lobby never interprets the contents; it only compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::validation("Player id cannot be empty"));
        }
        if id.chars().count() > MAX_PLAYER_ID_LENGTH {
            return Err(DomainError::validation(format!(
                "Player id cannot exceed {} characters",
                MAX_PLAYER_ID_LENGTH
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PlayerId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> String {
        id.0
    }
}

/// An authenticated player: stable id plus the name shown to other players.
///
/// Immutable once a session has been created for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerIdentity {
    id: PlayerId,
    display_name: DisplayName,
}

impl PlayerIdentity {
    pub fn new(id: PlayerId, display_name: DisplayName) -> Self {
        Self { id, display_name }
    }

    /// Build an identity from raw strings, validating both parts.
    pub fn parse(id: impl Into<String>, display_name: impl Into<String>) -> Result<Self, DomainError> {
        Ok(Self::new(PlayerId::new(id)?, DisplayName::new(display_name)?))
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn display_name(&self) -> &DisplayName {
        &self.display_name
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_validates_both_parts() {
        let identity = PlayerIdentity::parse("p-1", " Alice ").expect("valid identity");
        assert_eq!(identity.id().as_str(), "p-1");
        assert_eq!(identity.display_name().as_str(), "Alice");

        assert!(PlayerIdentity::parse("", "Alice").is_err());
        assert!(PlayerIdentity::parse("p-1", "").is_err());
    }

    #[test]
    fn player_id_rejects_oversized() {
        assert!(PlayerId::new("x".repeat(MAX_PLAYER_ID_LENGTH + 1)).is_err());
    }
}
