//! Liveness monitor: closes sessions that stopped talking.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::registry::LobbyRegistry;
use super::session::CloseReason;

pub struct HeartbeatMonitor {
    registry: Arc<LobbyRegistry>,
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<LobbyRegistry>, interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            interval,
            timeout,
        }
    }

    /// Close every active session idle for longer than the timeout at `now`.
    /// Returns the number of sessions closed.
    pub fn sweep(&self, now: Instant) -> usize {
        let idle: Vec<_> = self
            .registry
            .sessions()
            .into_iter()
            .filter(|session| {
                session.is_active()
                    && now.saturating_duration_since(session.last_activity()) > self.timeout
            })
            .collect();

        let mut closed = 0;
        for session in idle {
            tracing::info!(
                session_id = %session.id(),
                player_id = %session.identity().id(),
                idle_ms = now.saturating_duration_since(session.last_activity()).as_millis() as u64,
                "Heartbeat timeout"
            );
            if session.close(CloseReason::Timeout) {
                closed += 1;
            }
        }
        closed
    }

    /// Sweep on every tick until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            "Heartbeat monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let closed = self.sweep(Instant::now());
                    if closed > 0 {
                        tracing::debug!(closed, "Heartbeat sweep closed idle sessions");
                    }
                }
            }
        }
        tracing::info!("Heartbeat monitor stopped");
    }
}
