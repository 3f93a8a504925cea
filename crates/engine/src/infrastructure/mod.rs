//! Infrastructure: configuration and the authentication boundary.

pub mod auth;
pub mod config;
pub mod ports;
