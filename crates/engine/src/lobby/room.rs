//! A named room and its lock-protected membership.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use gamelobby_domain::{PlayerId, RoomName, SessionId};
use gamelobby_shared::MemberInfo;

use super::session::Session;

/// One member of a room.
pub struct Member {
    session: Arc<Session>,
    ready: bool,
    ordinal: u64,
}

impl Member {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Join order within the room; lower joined earlier.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            player: self.session.player_info(),
            ready: self.ready,
            presence: self.session.presence(),
        }
    }
}

/// Mutable room state. Only reachable through [`Room::lock`].
#[derive(Default)]
pub struct RoomState {
    /// Kept in join order
    members: Vec<Member>,
    next_seq: u64,
    next_ordinal: u64,
    closed: bool,
}

impl RoomState {
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A closed room has been removed from the registry and must not be
    /// joined or sequenced again.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn member(&self, session_id: SessionId) -> Option<&Member> {
        self.members.iter().find(|m| m.session.id() == session_id)
    }

    pub fn contains_player(&self, player_id: &PlayerId) -> bool {
        self.members
            .iter()
            .any(|m| m.session.identity().id() == player_id)
    }

    /// Earliest-joined member still present.
    pub fn host(&self) -> Option<&Member> {
        self.members.first()
    }

    /// Newest sequence number handed out, `None` before the first event.
    pub fn last_sequence(&self) -> Option<u64> {
        self.next_seq.checked_sub(1)
    }

    pub fn member_infos(&self) -> Vec<MemberInfo> {
        self.members.iter().map(Member::info).collect()
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub(crate) fn add(&mut self, session: Arc<Session>) {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.members.push(Member {
            session,
            ready: false,
            ordinal,
        });
    }

    pub(crate) fn remove(&mut self, session_id: SessionId) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|m| m.session.id() == session_id)?;
        Some(self.members.remove(index))
    }

    pub(crate) fn set_ready(&mut self, session_id: SessionId, ready: bool) -> bool {
        match self.members.iter_mut().find(|m| m.session.id() == session_id) {
            Some(member) => {
                member.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Mark the room closed and hand back whoever was still inside.
    pub(crate) fn close(&mut self) -> Vec<Member> {
        self.closed = true;
        std::mem::take(&mut self.members)
    }
}

/// Point-in-time copy of a room for listings and the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSnapshot {
    pub room: RoomName,
    pub created_at: DateTime<Utc>,
    pub members: Vec<MemberInfo>,
    pub last_sequence: Option<u64>,
}

pub struct Room {
    name: RoomName,
    created_at: DateTime<Utc>,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            created_at: Utc::now(),
            state: Mutex::new(RoomState::default()),
        }
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Lock the room. Never hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let state = self.lock();
        RoomSnapshot {
            room: self.name.clone(),
            created_at: self.created_at,
            members: state.member_infos(),
            last_sequence: state.last_sequence(),
        }
    }
}
