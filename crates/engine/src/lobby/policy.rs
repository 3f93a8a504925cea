//! Who may emit a room's start signal.

use std::fmt;
use std::str::FromStr;

use gamelobby_domain::SessionId;

use super::room::RoomState;

/// Start-signal authority, owned by the registry and consulted by the
/// dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPolicy {
    /// Any current member may start the match
    #[default]
    AnyMember,
    /// Only the earliest-joined member still in the room
    HostOnly,
}

impl StartPolicy {
    pub fn permits(&self, room: &RoomState, sender: SessionId) -> bool {
        match self {
            StartPolicy::AnyMember => room.member(sender).is_some(),
            StartPolicy::HostOnly => room.host().map(|m| m.session().id()) == Some(sender),
        }
    }
}

impl fmt::Display for StartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPolicy::AnyMember => write!(f, "any"),
            StartPolicy::HostOnly => write!(f, "host"),
        }
    }
}

impl FromStr for StartPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "any_member" | "anymember" => Ok(StartPolicy::AnyMember),
            "host" | "host_only" | "hostonly" => Ok(StartPolicy::HostOnly),
            _ => Err(()),
        }
    }
}
