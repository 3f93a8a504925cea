//! Typed reasons carried by rejections, errors and server-initiated closes.
//!
//! Clients branch on these, so every failure the server reports has its own
//! variant rather than a free-form string.

use serde::{Deserialize, Serialize};

/// Why a handshake was refused. The connection is closed after this reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum HandshakeRejectReason {
    /// Client speaks a different protocol version
    UnsupportedVersion { server_version: u32 },
    /// The authentication collaborator refused the token
    InvalidCredentials,
    /// First frame was not a handshake, or none arrived in time
    ExpectedHandshake,
    /// Connection limit reached; retry later
    ServerFull,
    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

/// Why a `JoinRoom` request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum JoinRejectReason {
    /// The player already holds a room membership; leave it first
    IdentityAlreadyInRoom { room: String },
    /// The requested name breaks the room naming rules
    InvalidRoomName { message: String },
    /// The room reached its member cap
    RoomFull { capacity: usize },
    /// The session is shutting down
    NotActive,
    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

/// Classification for `ServerMessage::Error` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotInRoom,
    NotAuthorized,
    InvalidMessage,
    AlreadyHandshaken,
    UnknownMessage,
    #[serde(other)]
    Unknown,
}

/// Why a member left a room, as reported in `leave` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    /// Sent `LeaveRoom`
    Left,
    /// Connection closed or failed
    Disconnected,
    /// Heartbeat timeout
    TimedOut,
    /// Removed by an operator or replaced by a newer session
    Kicked,
    #[serde(other)]
    Unknown,
}

/// Why the server is closing a connection. Sent as the final frame when the
/// close was initiated server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    Timeout,
    Superseded,
    Kicked,
    Shutdown,
    SlowConsumer,
    ProtocolError,
    #[serde(other)]
    Unknown,
}
