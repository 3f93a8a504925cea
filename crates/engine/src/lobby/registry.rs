//! Room registry: room membership and the identity table.
//!
//! Rooms live in a `DashMap`, each behind its own mutex, so different rooms
//! never contend. Lock order is room first, then the session's membership
//! lock. A map guard is never held while a room is locked.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use gamelobby_domain::{PlayerId, RoomName, SessionId};
use gamelobby_shared::{
    EventPayload, JoinRejectReason, LeaveReason, MemberInfo, RoomSummary, ServerMessage,
};

use super::dispatcher::{deliver, Audience, DeliveryReport};
use super::policy::StartPolicy;
use super::room::{Room, RoomSnapshot, RoomState};
use super::session::{CloseReason, Session};

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Member cap per room; unlimited when `None`
    pub max_room_members: Option<usize>,
    pub start_policy: StartPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("Already a member of room {0}")]
    IdentityAlreadyInRoom(RoomName),
    #[error("Room {room} is full ({capacity} members)")]
    RoomFull { room: RoomName, capacity: usize },
    #[error("Session is not active")]
    NotActive,
}

impl JoinError {
    pub fn reject_reason(&self) -> JoinRejectReason {
        match self {
            JoinError::IdentityAlreadyInRoom(room) => JoinRejectReason::IdentityAlreadyInRoom {
                room: room.to_string(),
            },
            JoinError::RoomFull { capacity, .. } => JoinRejectReason::RoomFull {
                capacity: *capacity,
            },
            JoinError::NotActive => JoinRejectReason::NotActive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("Session closed before it could be registered")]
    SessionClosed,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room: RoomName,
    /// Members present before the join, in join order
    pub members: Vec<MemberInfo>,
    pub last_sequence: Option<u64>,
    /// The join created the room
    pub created: bool,
    /// The `join` event sent to existing members
    pub announcement: Option<DeliveryReport>,
}

#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub room: RoomName,
    /// The room became empty and was removed
    pub destroyed: bool,
    /// The `leave` event sent to remaining members
    pub announcement: Option<DeliveryReport>,
}

pub struct LobbyRegistry {
    rooms: DashMap<RoomName, Arc<Room>>,
    identities: DashMap<PlayerId, Arc<Session>>,
    config: RegistryConfig,
}

impl LobbyRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            identities: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn start_policy(&self) -> StartPolicy {
        self.config.start_policy
    }

    /// Activate a handshaken session and reserve its identity.
    ///
    /// A live session already holding the identity is closed as superseded
    /// and returned.
    pub fn register(&self, session: Arc<Session>) -> Result<Option<Arc<Session>>, RegisterError> {
        if !session.activate() {
            return Err(RegisterError::SessionClosed);
        }
        let player_id = session.identity().id().clone();
        let previous = self
            .identities
            .insert(player_id.clone(), Arc::clone(&session))
            .filter(|old| old.id() != session.id());

        // Whatever this insert displaced is superseded, even if this session
        // lost a race and is already closing.
        if let Some(old) = &previous {
            tracing::info!(
                session_id = %old.id(),
                player_id = %player_id,
                replaced_by = %session.id(),
                "Session superseded"
            );
            old.close(CloseReason::Superseded);
        }

        // Closed between activation and insert: its detach already ran.
        if !session.is_active() {
            self.release_identity(&session);
            return Err(RegisterError::SessionClosed);
        }

        tracing::info!(
            session_id = %session.id(),
            player_id = %player_id,
            peer_addr = %session.peer_addr(),
            "Session registered"
        );
        Ok(previous)
    }

    /// Add the session to a room, creating the room if needed.
    ///
    /// The joiner gets a `JoinAck` listing the existing members; they get a
    /// `join` event. Joining an empty room emits no event.
    pub fn join(&self, session: &Arc<Session>, name: RoomName) -> Result<JoinOutcome, JoinError> {
        loop {
            if !session.is_active() {
                return Err(JoinError::NotActive);
            }
            if let Some(current) = session.current_room() {
                return Err(JoinError::IdentityAlreadyInRoom(current));
            }

            let room = {
                let entry = self
                    .rooms
                    .entry(name.clone())
                    .or_insert_with(|| Arc::new(Room::new(name.clone())));
                Arc::clone(entry.value())
            };
            let mut state = room.lock();
            if state.is_closed() {
                // Destroyed between lookup and lock; the map has a fresh entry or none.
                continue;
            }

            if let Err(e) = self.admit(session, &name, &state) {
                self.discard_if_empty(&room, &mut state);
                return Err(e);
            }

            let created = state.is_empty();
            let members = state.member_infos();
            state.add(Arc::clone(session));

            let announcement = if created {
                None
            } else {
                Some(deliver(
                    &name,
                    &mut state,
                    session.player_info(),
                    EventPayload::Join,
                    Audience::AllExcept(session.id()),
                ))
            };
            let last_sequence = state.last_sequence();

            // Queued under the lock so it precedes any later room event.
            let _ = session.send(ServerMessage::JoinAck {
                room: name.to_string(),
                members: members.clone(),
                last_sequence,
            });
            drop(state);

            tracing::info!(
                session_id = %session.id(),
                player_id = %session.identity().id(),
                room = %name,
                created,
                "Player joined room"
            );
            return Ok(JoinOutcome {
                room: name,
                members,
                last_sequence,
                created,
                announcement,
            });
        }
    }

    /// Checks done with the room locked. Sets the session's room pointer on success.
    fn admit(&self, session: &Session, name: &RoomName, state: &RoomState) -> Result<(), JoinError> {
        if state.contains_player(session.identity().id()) {
            return Err(JoinError::IdentityAlreadyInRoom(name.clone()));
        }
        if let Some(capacity) = self.config.max_room_members {
            if state.len() >= capacity {
                return Err(JoinError::RoomFull {
                    room: name.clone(),
                    capacity,
                });
            }
        }

        let mut membership = session.membership();
        if !session.is_active() {
            return Err(JoinError::NotActive);
        }
        if let Some(current) = membership.as_ref() {
            return Err(JoinError::IdentityAlreadyInRoom(current.clone()));
        }
        *membership = Some(name.clone());
        Ok(())
    }

    /// Remove the session from its room. Returns `None` if it was not in one.
    pub fn leave(&self, session: &Session, reason: LeaveReason) -> Option<LeaveOutcome> {
        let name = session.current_room()?;
        let Some(room) = self.room(&name) else {
            clear_pointer(session, &name);
            return None;
        };

        let mut state = room.lock();
        {
            let mut membership = session.membership();
            if membership.as_ref() != Some(&name) {
                return None;
            }
            *membership = None;
        }
        let member = state.remove(session.id())?;

        let destroyed = state.is_empty();
        let announcement = if destroyed {
            self.discard_if_empty(&room, &mut state);
            None
        } else {
            Some(deliver(
                &name,
                &mut state,
                member.session().player_info(),
                EventPayload::Leave { reason },
                Audience::Everyone,
            ))
        };
        drop(state);

        tracing::info!(
            session_id = %session.id(),
            player_id = %session.identity().id(),
            room = %name,
            reason = ?reason,
            destroyed,
            "Player left room"
        );
        Some(LeaveOutcome {
            room: name,
            destroyed,
            announcement,
        })
    }

    /// Called by a closing session: leave its room and free its identity.
    pub(crate) fn detach(&self, session: &Session, reason: LeaveReason) {
        self.leave(session, reason);
        self.release_identity(session);
    }

    fn release_identity(&self, session: &Session) {
        let session_id = session.id();
        if self
            .identities
            .remove_if(session.identity().id(), |_, held| held.id() == session_id)
            .is_some()
        {
            tracing::debug!(session_id = %session_id, "Identity released");
        }
    }

    /// Mark an empty room closed and drop it from the map. Room lock held.
    fn discard_if_empty(&self, room: &Arc<Room>, state: &mut RoomState) {
        if !state.is_empty() || state.is_closed() {
            return;
        }
        state.close();
        self.rooms
            .remove_if(room.name(), |_, current| Arc::ptr_eq(current, room));
        tracing::info!(room = %room.name(), "Room destroyed");
    }

    pub fn room(&self, name: &RoomName) -> Option<Arc<Room>> {
        self.rooms.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn all_rooms(&self) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Snapshot of open rooms and their member counts, sorted by name.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<(RoomName, usize)> = self
            .all_rooms()
            .into_iter()
            .filter_map(|room| {
                let state = room.lock();
                (!state.is_closed()).then(|| (room.name().clone(), state.len()))
            })
            .collect();
        rooms.sort();
        rooms
            .into_iter()
            .map(|(room, member_count)| RoomSummary {
                room: room.to_string(),
                member_count,
            })
            .collect()
    }

    pub fn room_snapshot(&self, name: &RoomName) -> Option<RoomSnapshot> {
        self.room(name).map(|room| room.snapshot())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Operator close: evict every member with `RoomClosed` and destroy the room.
    ///
    /// Returns the number of members evicted, or `None` if no such room.
    pub fn close_room(&self, name: &RoomName) -> Option<usize> {
        let room = self.room(name)?;
        let mut state = room.lock();
        if state.is_closed() {
            return None;
        }
        let evicted = state.close();
        self.rooms
            .remove_if(name, |_, current| Arc::ptr_eq(current, &room));

        for member in &evicted {
            let session = member.session();
            clear_pointer(session, name);
            let _ = session.send(ServerMessage::RoomClosed {
                room: name.to_string(),
            });
        }
        drop(state);

        tracing::info!(room = %name, evicted = evicted.len(), "Room closed by operator");
        Some(evicted.len())
    }

    /// Registered sessions at this instant.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.identities
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn find_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.identities
            .iter()
            .find(|entry| entry.value().id() == id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn session_for(&self, player_id: &PlayerId) -> Option<Arc<Session>> {
        self.identities
            .get(player_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn session_count(&self) -> usize {
        self.identities.len()
    }

    /// Close every registered session. Returns how many this call closed.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let sessions = self.sessions();
        let closed = sessions
            .iter()
            .filter(|session| session.close(reason))
            .count();
        tracing::info!(closed, reason = ?reason, "Closed all sessions");
        closed
    }
}

fn clear_pointer(session: &Session, name: &RoomName) {
    let mut membership = session.membership();
    if membership.as_ref() == Some(name) {
        *membership = None;
    }
}
