//! Game Lobby Domain - vocabulary types shared by the wire protocol and the server.
//!
//! Everything here is validated by construction: a `RoomName` or `PlayerIdentity`
//! that exists is a legal one.

pub mod error;
pub mod ids;
pub mod player;
pub mod value_objects;

pub use error::DomainError;
pub use ids::SessionId;
pub use player::{PlayerId, PlayerIdentity};
pub use value_objects::{DisplayName, PresenceStatus, RoomName};
