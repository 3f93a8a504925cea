//! Lobby presence of a connected player.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// What a connected player is currently open to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Idle in the lobby and open to invitations
    #[default]
    Available,
    /// Connected but not accepting invitations
    DoNotDisturb,
    /// Watching rather than playing
    Spectating,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Available => "available",
            PresenceStatus::DoNotDisturb => "do_not_disturb",
            PresenceStatus::Spectating => "spectating",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(PresenceStatus::Available),
            "do_not_disturb" | "dnd" => Ok(PresenceStatus::DoNotDisturb),
            "spectating" | "spectator" => Ok(PresenceStatus::Spectating),
            other => Err(DomainError::parse(format!(
                "Unknown presence status: {}",
                other
            ))),
        }
    }
}
