//! Lobby core: sessions, rooms, sequencing and liveness.

pub mod dispatcher;
pub mod heartbeat;
pub mod outbound;
pub mod policy;
pub mod registry;
pub mod room;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::{BroadcastError, DeliveryReport, Dispatcher};
pub use heartbeat::HeartbeatMonitor;
pub use outbound::{OutboundQueue, PushOutcome};
pub use policy::StartPolicy;
pub use registry::{
    JoinError, JoinOutcome, LeaveOutcome, LobbyRegistry, RegisterError, RegistryConfig,
};
pub use room::{Room, RoomSnapshot};
pub use session::{CloseReason, SendError, Session, SessionState};
