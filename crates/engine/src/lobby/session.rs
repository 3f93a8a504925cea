//! One connected player's live server-side state.
//!
//! A `Session` is shared between its reader task, its writer task, the
//! registry (as a room member) and the heartbeat monitor. All of its mutable
//! state sits behind short-lived `std::sync` locks or atomics so any task can
//! inspect or close it without awaiting.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use gamelobby_domain::{PlayerIdentity, PresenceStatus, RoomName, SessionId};
use gamelobby_shared::{DisconnectReason, LeaveReason, PlayerInfo, ServerMessage};

use super::outbound::{OutboundQueue, PushOutcome};
use super::registry::LobbyRegistry;

/// Failure to enqueue a message for a session.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Session is closed")]
    Closed,
    #[error("Session outbound queue overflowed")]
    SlowConsumer,
}

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Handshake done, not yet registered
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Active,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client hung up or the connection failed
    PeerClosed,
    /// Heartbeat timeout
    Timeout,
    /// The same identity completed a newer handshake
    Superseded,
    /// Operator action
    Kicked,
    Shutdown,
    SlowConsumer,
    ProtocolError,
}

impl CloseReason {
    /// Notice sent to the client before closing, for server-initiated closes.
    pub fn notice(&self) -> Option<DisconnectReason> {
        match self {
            CloseReason::PeerClosed => None,
            CloseReason::Timeout => Some(DisconnectReason::Timeout),
            CloseReason::Superseded => Some(DisconnectReason::Superseded),
            CloseReason::Kicked => Some(DisconnectReason::Kicked),
            CloseReason::Shutdown => Some(DisconnectReason::Shutdown),
            CloseReason::SlowConsumer => Some(DisconnectReason::SlowConsumer),
            CloseReason::ProtocolError => Some(DisconnectReason::ProtocolError),
        }
    }

    /// Reason reported to the remaining members of the session's room.
    pub fn leave_reason(&self) -> LeaveReason {
        match self {
            CloseReason::Timeout => LeaveReason::TimedOut,
            CloseReason::Superseded | CloseReason::Kicked => LeaveReason::Kicked,
            CloseReason::PeerClosed
            | CloseReason::Shutdown
            | CloseReason::SlowConsumer
            | CloseReason::ProtocolError => LeaveReason::Disconnected,
        }
    }
}

pub struct Session {
    id: SessionId,
    identity: PlayerIdentity,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    close_reason: OnceLock<CloseReason>,
    /// Room this session belongs to. Written only while the room's lock is held.
    room: Mutex<Option<RoomName>>,
    presence: Mutex<PresenceStatus>,
    last_activity: Mutex<Instant>,
    outbound: OutboundQueue,
    cancel: CancellationToken,
    registry: Weak<LobbyRegistry>,
}

impl Session {
    pub fn new(
        identity: PlayerIdentity,
        peer_addr: SocketAddr,
        outbound_capacity: usize,
        registry: Weak<LobbyRegistry>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            identity,
            peer_addr,
            connected_at: Utc::now(),
            state: AtomicU8::new(SessionState::Connecting as u8),
            close_reason: OnceLock::new(),
            room: Mutex::new(None),
            presence: Mutex::new(PresenceStatus::default()),
            last_activity: Mutex::new(Instant::now()),
            outbound: OutboundQueue::new(outbound_capacity),
            cancel: CancellationToken::new(),
            registry,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    pub fn player_info(&self) -> PlayerInfo {
        PlayerInfo::from(&self.identity)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Move `Connecting -> Active`. Fails if the session was already closed.
    pub(crate) fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn current_room(&self) -> Option<RoomName> {
        self.membership().clone()
    }

    /// Lock the room pointer. Callers holding a room lock take it second.
    pub(crate) fn membership(&self) -> MutexGuard<'_, Option<RoomName>> {
        self.room.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn presence(&self) -> PresenceStatus {
        *self
            .presence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_presence(&self, status: PresenceStatus) {
        *self
            .presence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = status;
    }

    /// Refresh the liveness timestamp.
    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    /// Enqueue a message for the writer. Never blocks.
    pub fn send(&self, message: ServerMessage) -> Result<PushOutcome, SendError> {
        self.send_shared(Arc::new(message))
    }

    /// Enqueue a message shared with other sessions.
    pub fn send_shared(&self, message: Arc<ServerMessage>) -> Result<PushOutcome, SendError> {
        if self.state() >= SessionState::Closing {
            return Err(SendError::Closed);
        }
        self.outbound.push(message)
    }

    /// Resolves once the session starts closing.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tear the session down.
    ///
    /// Idempotent: only the first call does the work and returns `true`.
    /// Queues a disconnect notice for server-initiated closes, stops the
    /// reader and writer, then leaves the room and releases the identity.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SessionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let _ = self.close_reason.set(reason);
        tracing::info!(
            session_id = %self.id,
            player_id = %self.identity.id(),
            reason = ?reason,
            "Closing session"
        );

        if let Some(notice) = reason.notice() {
            self.outbound
                .push_final(Arc::new(ServerMessage::Disconnect { reason: notice }));
        }
        self.outbound.close();
        self.cancel.cancel();

        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self, reason.leave_reason());
        }

        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("player", &self.identity.id())
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::registry::RegistryConfig;
    use crate::lobby::test_support::{connect, detached_session, drain, events, room};
    use gamelobby_shared::{ErrorCode, EventPayload};

    #[test]
    fn lifecycle_moves_forward_only() {
        let session = detached_session("Ada");
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.activate());
        assert!(!session.activate());
        assert!(session.is_active());

        assert!(session.close(CloseReason::Kicked));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.activate());
    }

    #[test]
    fn close_is_idempotent() {
        let session = detached_session("Ada");
        session.activate();
        assert!(session.close(CloseReason::Timeout));
        assert!(!session.close(CloseReason::Kicked));
        assert_eq!(session.close_reason(), Some(CloseReason::Timeout));
        assert!(session.cancellation_token().is_cancelled());
    }

    #[test]
    fn concurrent_close_tears_down_once() {
        let registry = Arc::new(LobbyRegistry::new(RegistryConfig::default()));
        let ada = connect(&registry, "Ada");
        let bob = connect(&registry, "Bob");
        registry.join(&ada, room("alpha")).expect("join");
        registry.join(&bob, room("alpha")).expect("join");
        drain(&ada);

        let barrier = std::sync::Barrier::new(8);
        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let (bob, barrier) = (&bob, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        bob.close(CloseReason::Timeout)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(|joined| matches!(joined, Ok(true)))
                .count()
        });

        assert_eq!(winners, 1);
        assert_eq!(bob.state(), SessionState::Closed);
        let leaves: Vec<_> = events(&drain(&ada))
            .into_iter()
            .filter(|(_, _, payload)| matches!(payload, EventPayload::Leave { .. }))
            .collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(
            leaves[0].2,
            EventPayload::Leave {
                reason: LeaveReason::TimedOut
            }
        );
    }

    #[test]
    fn server_initiated_close_queues_notice() {
        let session = detached_session("Ada");
        session.activate();
        session.send(ServerMessage::Pong).expect("send");
        session.close(CloseReason::Superseded);

        let drained = session.outbound().drain();
        assert!(drained.closed);
        assert_eq!(
            drained.messages.last().map(|m| m.as_ref().clone()),
            Some(ServerMessage::Disconnect {
                reason: DisconnectReason::Superseded
            })
        );
    }

    #[test]
    fn peer_close_sends_no_notice() {
        let session = detached_session("Ada");
        session.activate();
        session.close(CloseReason::PeerClosed);
        assert!(session.outbound().drain().messages.is_empty());
    }

    #[test]
    fn send_fails_once_closed() {
        let session = detached_session("Ada");
        session.activate();
        session
            .send(ServerMessage::error(ErrorCode::NotInRoom, "x"))
            .expect("active send");
        session.close(CloseReason::Kicked);
        assert_eq!(session.send(ServerMessage::Pong), Err(SendError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn touch_refreshes_last_activity() {
        let session = detached_session("Ada");
        let before = session.last_activity();
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        session.touch();
        assert_eq!(
            session.last_activity() - before,
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn close_reasons_map_to_leave_reasons() {
        assert_eq!(CloseReason::Timeout.leave_reason(), LeaveReason::TimedOut);
        assert_eq!(CloseReason::Kicked.leave_reason(), LeaveReason::Kicked);
        assert_eq!(CloseReason::PeerClosed.leave_reason(), LeaveReason::Disconnected);
        assert_eq!(CloseReason::PeerClosed.notice(), None);
    }
}
