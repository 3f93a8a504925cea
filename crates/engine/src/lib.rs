//! Game Lobby Engine library.
//!
//! This crate contains all server-side code for the game lobby.
//!
//! ## Structure
//!
//! - `lobby/` - Sessions, rooms, the broadcast dispatcher and the heartbeat monitor
//! - `infrastructure/` - Configuration and the authentication port with its adapters
//! - `api/` - TCP acceptor, per-connection tasks and the admin HTTP routes
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod lobby;

/// End-to-end tests driving the real server over TCP.
#[cfg(test)]
mod e2e_tests;

pub use app::{LobbyServer, ServerHandle};
