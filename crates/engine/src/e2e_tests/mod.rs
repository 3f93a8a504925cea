//! End-to-end tests: a real `LobbyServer` on a loopback port, driven by
//! framed TCP clients.
//!
//! # Running E2E Tests
//!
//! ```bash
//! cargo test -p gamelobby-engine --lib e2e_tests
//! ```

mod e2e_helpers;

pub use e2e_helpers::*;
