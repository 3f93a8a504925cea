//! Game Lobby Protocol - shared types for server and client communication
//!
//! This crate contains everything both ends of a lobby connection must agree on:
//! - Message enums (`ClientMessage`, `ServerMessage`) and room event payloads
//! - Typed rejection, error and disconnect reasons
//! - The length-prefixed frame codec
//!
//! # Design Principles
//!
//! 1. **No business logic** - pure data types and serialization
//! 2. **No domain newtypes on the wire** - identifiers and room names travel as
//!    plain strings and are validated by the server on receipt

pub mod codec;
pub mod messages;
pub mod responses;

pub use codec::{decode_frame, encode_frame, DecodeError, FrameCodec, LENGTH_PREFIX_BYTES};
pub use messages::{
    ClientMessage, EventPayload, MemberInfo, PlayerInfo, RoomSummary, ServerMessage,
};
pub use responses::{
    DisconnectReason, ErrorCode, HandshakeRejectReason, JoinRejectReason, LeaveReason,
};

/// Protocol version spoken by this build. Handshakes carrying any other
/// version are rejected.
pub const PROTOCOL_VERSION: u32 = 1;
