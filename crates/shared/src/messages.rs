//! Lobby message types for server-client communication
//!
//! Clients send `ClientMessage`, the server sends `ServerMessage`. Both are
//! internally tagged with a `type` field.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Renaming or removing variants is a breaking change and bumps `PROTOCOL_VERSION`
//! - Unknown variants deserialize to `Unknown`

use serde::{Deserialize, Serialize};

use gamelobby_domain::{PlayerIdentity, PresenceStatus};

use crate::responses::{
    DisconnectReason, ErrorCode, HandshakeRejectReason, JoinRejectReason, LeaveReason,
};

// =============================================================================
// Client Messages (Client → Server)
// =============================================================================

/// Messages from a game client to the lobby server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First frame on every connection
    Handshake {
        protocol_version: u32,
        auth_token: String,
    },
    /// Join (creating if needed) a named room
    JoinRoom { room: String },
    /// Leave the current room; acknowledged even when not in one
    LeaveRoom,
    /// Room chat line
    Chat { body: String },
    /// Toggle ready state in the current room
    ReadyState { ready: bool },
    /// Ask the room to start the match
    StartSignal,
    /// Change lobby presence
    SetPresence { status: PresenceStatus },
    /// Snapshot of open rooms
    ListRooms,
    /// Keep-alive; answered with `Pong`
    Heartbeat,
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Handshake { .. } => "handshake",
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::LeaveRoom => "leave_room",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::ReadyState { .. } => "ready_state",
            ClientMessage::StartSignal => "start_signal",
            ClientMessage::SetPresence { .. } => "set_presence",
            ClientMessage::ListRooms => "list_rooms",
            ClientMessage::Heartbeat => "heartbeat",
            ClientMessage::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Server Messages (Server → Client)
// =============================================================================

/// Messages from the lobby server to a game client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake accepted; the session is live
    HandshakeAck { player: PlayerInfo, session_id: String },
    /// Handshake refused; the connection closes next
    HandshakeReject { reason: HandshakeRejectReason },
    /// Joined a room. `members` lists the other members in join order and
    /// `last_sequence` is the newest event number the room has assigned
    /// (events after it will be delivered to this session).
    JoinAck {
        room: String,
        members: Vec<MemberInfo>,
        last_sequence: Option<u64>,
    },
    JoinReject {
        room: String,
        reason: JoinRejectReason,
    },
    LeaveAck,
    /// A sequenced room event
    Event {
        room: String,
        seq: u64,
        sender: PlayerInfo,
        payload: EventPayload,
    },
    /// The room this client belonged to no longer exists
    RoomClosed { room: String },
    PresenceAck { status: PresenceStatus },
    RoomList { rooms: Vec<RoomSummary> },
    Pong,
    /// An operation was refused
    Error { code: ErrorCode, message: String },
    /// Final frame before a server-initiated close
    Disconnect { reason: DisconnectReason },
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Build an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    /// Whether a slow consumer's queue may discard this message.
    ///
    /// Only chatter is expendable. Acks, membership changes, ready/start
    /// coordination and close notices must always reach the client.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            ServerMessage::Event {
                payload: EventPayload::Chat { .. } | EventPayload::Presence { .. },
                ..
            }
        )
    }

    /// Sequence number for room events, `None` for everything else.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            ServerMessage::Event { seq, .. } => Some(*seq),
            _ => None,
        }
    }
}

// =============================================================================
// Room Events
// =============================================================================

/// Body of a room event, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Chat { body: String },
    Ready { ready: bool },
    Start,
    Join,
    Leave { reason: LeaveReason },
    Presence { status: PresenceStatus },
    #[serde(other)]
    Unknown,
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Chat { .. } => "chat",
            EventPayload::Ready { .. } => "ready",
            EventPayload::Start => "start",
            EventPayload::Join => "join",
            EventPayload::Leave { .. } => "leave",
            EventPayload::Presence { .. } => "presence",
            EventPayload::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Shared DTOs
// =============================================================================

/// Public view of a player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: String,
    pub display_name: String,
}

impl From<&PlayerIdentity> for PlayerInfo {
    fn from(identity: &PlayerIdentity) -> Self {
        Self {
            player_id: identity.id().to_string(),
            display_name: identity.display_name().to_string(),
        }
    }
}

/// A room member as listed in `JoinAck`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub player: PlayerInfo,
    pub ready: bool,
    #[serde(default)]
    pub presence: PresenceStatus,
}

/// One entry of a room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room: String,
    pub member_count: usize,
}
