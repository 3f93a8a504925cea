//! Broadcast dispatcher: sequences room events and fans them out.
//!
//! Sequencing and enqueueing happen under the room's lock, so every member
//! sees events in sequence order. A member whose queue refuses an event is
//! recorded as a failed target; delivery to the others carries on.

use std::sync::Arc;

use thiserror::Error;

use gamelobby_domain::{PresenceStatus, RoomName, SessionId};
use gamelobby_shared::{EventPayload, PlayerInfo, ServerMessage};

use super::registry::LobbyRegistry;
use super::room::RoomState;
use super::session::Session;

/// Outcome of one sequenced broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub room: RoomName,
    pub seq: u64,
    pub delivered: usize,
    pub failed: Vec<SessionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Not in a room")]
    NotInRoom,
    #[error("Room {0} no longer exists")]
    RoomClosed(RoomName),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("Session is not active")]
    NotActive,
}

/// Which members receive an event.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Audience {
    Everyone,
    AllExcept(SessionId),
}

/// Assign the next sequence number and enqueue the event on the audience.
///
/// Must be called with the room's lock held.
pub(crate) fn deliver(
    room: &RoomName,
    state: &mut RoomState,
    sender: PlayerInfo,
    payload: EventPayload,
    audience: Audience,
) -> DeliveryReport {
    let seq = state.next_sequence();
    let kind = payload.kind();
    let event = Arc::new(ServerMessage::Event {
        room: room.to_string(),
        seq,
        sender,
        payload,
    });

    let mut report = DeliveryReport {
        room: room.clone(),
        seq,
        delivered: 0,
        failed: Vec::new(),
    };
    for member in state.members() {
        let session = member.session();
        if let Audience::AllExcept(excluded) = audience {
            if session.id() == excluded {
                continue;
            }
        }
        match session.send_shared(Arc::clone(&event)) {
            Ok(_) => report.delivered += 1,
            Err(e) => {
                tracing::debug!(
                    room = %room,
                    seq,
                    session_id = %session.id(),
                    error = %e,
                    "Event not delivered"
                );
                report.failed.push(session.id());
            }
        }
    }

    tracing::debug!(
        room = %room,
        seq,
        kind,
        delivered = report.delivered,
        failed = report.failed.len(),
        "Event broadcast"
    );
    report
}

/// Handles chat, ready, start and presence traffic from room members.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<LobbyRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<LobbyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<LobbyRegistry> {
        &self.registry
    }

    pub fn chat(&self, session: &Session, body: String) -> Result<DeliveryReport, BroadcastError> {
        if body.trim().is_empty() {
            return Err(BroadcastError::InvalidMessage(
                "chat body must not be empty".to_string(),
            ));
        }
        self.broadcast(session, EventPayload::Chat { body })
    }

    pub fn set_ready(
        &self,
        session: &Session,
        ready: bool,
    ) -> Result<DeliveryReport, BroadcastError> {
        self.broadcast(session, EventPayload::Ready { ready })
    }

    pub fn start(&self, session: &Session) -> Result<DeliveryReport, BroadcastError> {
        self.broadcast(session, EventPayload::Start)
    }

    /// Record the new status and tell the rest of the room, if in one.
    pub fn set_presence(&self, session: &Session, status: PresenceStatus) -> Option<DeliveryReport> {
        session.set_presence(status);
        if session.current_room().is_none() {
            return None;
        }
        self.broadcast(session, EventPayload::Presence { status }).ok()
    }

    /// Sequence `payload` in the sender's room and deliver it.
    ///
    /// Chat, ready and start reach every member including the sender;
    /// presence changes reach the other members.
    pub fn broadcast(
        &self,
        session: &Session,
        payload: EventPayload,
    ) -> Result<DeliveryReport, BroadcastError> {
        if matches!(
            payload,
            EventPayload::Join | EventPayload::Leave { .. } | EventPayload::Unknown
        ) {
            return Err(BroadcastError::InvalidMessage(format!(
                "{} events cannot be sent by members",
                payload.kind()
            )));
        }
        if !session.is_active() {
            return Err(BroadcastError::NotActive);
        }
        let name = session.current_room().ok_or(BroadcastError::NotInRoom)?;
        let Some(room) = self.registry.room(&name) else {
            return Err(self.stale_room(session, name));
        };

        let mut state = room.lock();
        if state.is_closed() || state.member(session.id()).is_none() {
            drop(state);
            return Err(self.stale_room(session, name));
        }

        let audience = match &payload {
            EventPayload::Ready { ready } => {
                state.set_ready(session.id(), *ready);
                Audience::Everyone
            }
            EventPayload::Start => {
                let policy = self.registry.start_policy();
                if !policy.permits(&state, session.id()) {
                    tracing::warn!(
                        room = %name,
                        session_id = %session.id(),
                        policy = %policy,
                        "Start signal refused"
                    );
                    return Err(BroadcastError::NotAuthorized(format!(
                        "start policy '{policy}' does not allow this member to start"
                    )));
                }
                Audience::Everyone
            }
            EventPayload::Presence { .. } => Audience::AllExcept(session.id()),
            _ => Audience::Everyone,
        };

        Ok(deliver(
            &name,
            &mut state,
            session.player_info(),
            payload,
            audience,
        ))
    }

    /// The session points at a room it is no longer part of.
    fn stale_room(&self, session: &Session, name: RoomName) -> BroadcastError {
        {
            let mut membership = session.membership();
            if membership.as_ref() == Some(&name) {
                *membership = None;
            }
        }
        tracing::warn!(room = %name, session_id = %session.id(), "Stale room pointer cleared");
        let _ = session.send(ServerMessage::RoomClosed {
            room: name.to_string(),
        });
        BroadcastError::RoomClosed(name)
    }
}
