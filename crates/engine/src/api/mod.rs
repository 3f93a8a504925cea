//! Network entry points: the game protocol listener and the admin HTTP surface.

pub mod acceptor;
pub mod admin;
pub mod connection;

pub use acceptor::{AcceptError, Acceptor};
pub use connection::{ConnectionSettings, LobbyContext};
