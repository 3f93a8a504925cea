//! Helpers shared by the lobby unit tests.

use std::sync::{Arc, Weak};

use gamelobby_domain::{PlayerIdentity, RoomName};
use gamelobby_shared::{EventPayload, PlayerInfo, ServerMessage};

use super::registry::LobbyRegistry;
use super::session::Session;

fn identity(name: &str) -> PlayerIdentity {
    PlayerIdentity::parse(name.to_lowercase(), name).expect("valid identity")
}

/// A session wired to no registry, still `Connecting`.
pub(crate) fn detached_session(name: &str) -> Session {
    Session::new(
        identity(name),
        "127.0.0.1:4000".parse().expect("addr"),
        64,
        Weak::new(),
    )
}

/// A session wired to `registry` but not yet registered.
pub(crate) fn pending_session(registry: &Arc<LobbyRegistry>, name: &str) -> Arc<Session> {
    Arc::new(Session::new(
        identity(name),
        "127.0.0.1:4000".parse().expect("addr"),
        64,
        Arc::downgrade(registry),
    ))
}

/// A registered, active session.
pub(crate) fn connect(registry: &Arc<LobbyRegistry>, name: &str) -> Arc<Session> {
    let session = pending_session(registry, name);
    registry
        .register(Arc::clone(&session))
        .expect("register session");
    session
}

pub(crate) fn room(name: &str) -> RoomName {
    RoomName::new(name).expect("valid room name")
}

/// Everything queued for the session so far.
pub(crate) fn drain(session: &Session) -> Vec<ServerMessage> {
    session
        .outbound()
        .drain()
        .messages
        .into_iter()
        .map(|message| message.as_ref().clone())
        .collect()
}

/// The room events among `messages` as `(seq, sender, payload)`.
pub(crate) fn events(messages: &[ServerMessage]) -> Vec<(u64, PlayerInfo, EventPayload)> {
    messages
        .iter()
        .filter_map(|message| match message {
            ServerMessage::Event {
                seq,
                sender,
                payload,
                ..
            } => Some((*seq, sender.clone(), payload.clone())),
            _ => None,
        })
        .collect()
}
