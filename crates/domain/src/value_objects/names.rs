//! Validated name newtypes
//!
//! Lengths are counted in characters, not bytes, so multi-byte names get the
//! same budget as ASCII ones.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Maximum length for room names
pub const MAX_ROOM_NAME_LENGTH: usize = 64;

/// Maximum length for player display names
pub const MAX_DISPLAY_NAME_LENGTH: usize = 32;

// ============================================================================
// RoomName
// ============================================================================

/// A validated room name (1-64 chars, case-sensitive, no control characters).
///
/// Room names are used verbatim as registry keys: `"Alpha"` and `"alpha"` are
/// different rooms, and surrounding whitespace is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    /// Create a new validated room name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if:
    /// - The name is empty
    /// - The name exceeds 64 characters
    /// - The name contains control characters
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::validation("Room name cannot be empty"));
        }
        if name.chars().count() > MAX_ROOM_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "Room name cannot exceed {} characters",
                MAX_ROOM_NAME_LENGTH
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(DomainError::validation(
                "Room name cannot contain control characters",
            ));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RoomName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RoomName> for String {
    fn from(name: RoomName) -> String {
        name.0
    }
}

// ============================================================================
// DisplayName
// ============================================================================

/// A validated player display name (non-empty, <=32 chars, trimmed)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    /// Create a new validated display name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if:
    /// - The name is empty after trimming
    /// - The name exceeds 32 characters after trimming
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Display name cannot be empty"));
        }
        if trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "Display name cannot exceed {} characters",
                MAX_DISPLAY_NAME_LENGTH
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DisplayName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DisplayName> for String {
    fn from(name: DisplayName) -> String {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_name_accepts_boundary_lengths() {
        assert!(RoomName::new("a").is_ok());
        assert!(RoomName::new("x".repeat(MAX_ROOM_NAME_LENGTH)).is_ok());
        assert!(RoomName::new("é".repeat(MAX_ROOM_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn room_name_rejects_empty_and_too_long() {
        assert!(RoomName::new("").is_err());
        assert!(RoomName::new("x".repeat(MAX_ROOM_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn room_name_rejects_control_characters() {
        let err = RoomName::new("lobby\n1").expect_err("newline must be rejected");
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn room_name_is_case_sensitive_and_untrimmed() {
        let upper = RoomName::new("Alpha").expect("valid");
        let lower = RoomName::new("alpha").expect("valid");
        assert_ne!(upper, lower);
        assert_eq!(RoomName::new(" alpha").expect("valid").as_str(), " alpha");
    }

    #[test]
    fn room_name_deserialization_validates() {
        let ok: RoomName = serde_json::from_str("\"alpha\"").expect("valid name");
        assert_eq!(ok.as_str(), "alpha");
        assert!(serde_json::from_str::<RoomName>("\"\"").is_err());
    }

    #[test]
    fn display_name_trims_whitespace() {
        let name = DisplayName::new("  Alice  ").expect("valid");
        assert_eq!(name.as_str(), "Alice");
    }

    #[test]
    fn display_name_rejects_blank_and_long() {
        assert!(DisplayName::new("   ").is_err());
        assert!(DisplayName::new("n".repeat(MAX_DISPLAY_NAME_LENGTH + 1)).is_err());
    }
}
