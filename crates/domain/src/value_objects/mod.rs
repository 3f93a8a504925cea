//! Value objects - validated, immutable building blocks.

mod names;
mod presence;

pub use names::{DisplayName, RoomName, MAX_DISPLAY_NAME_LENGTH, MAX_ROOM_NAME_LENGTH};
pub use presence::PresenceStatus;
