//! TCP accept loop with admission control.
//!
//! Admission is a semaphore sized to the connection limit. When no permit is
//! free the connection is refused on the spot with a best-effort
//! `HandshakeReject{server_full}`; it is never queued.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use gamelobby_shared::{encode_frame, HandshakeRejectReason, ServerMessage};

use super::connection::{handle_connection, LobbyContext};

#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("Listener failed: {0}")]
    Listener(#[from] io::Error),
}

pub struct Acceptor {
    listener: TcpListener,
    context: Arc<LobbyContext>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    tracker: TaskTracker,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        context: Arc<LobbyContext>,
        max_connections: usize,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            listener,
            context,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            tracker,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until shutdown. Non-transient listener errors end the loop and
    /// are returned; live connections are left to the shutdown path.
    pub async fn run(self) -> Result<(), AcceptError> {
        tracing::info!(
            addr = ?self.listener.local_addr().ok(),
            max_connections = self.max_connections,
            "Accepting connections"
        );

        loop {
            let accepted = tokio::select! {
                _ = self.context.shutdown.cancelled() => {
                    tracing::info!("Acceptor stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) if is_transient(&e) => {
                    tracing::warn!(error = %e, "Transient accept error");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Listener failed");
                    return Err(e.into());
                }
            };
            let _ = stream.set_nodelay(true);

            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => {
                    tracing::debug!(peer_addr = %peer_addr, "Connection accepted");
                    let context = Arc::clone(&self.context);
                    self.tracker.spawn(async move {
                        handle_connection(context, stream, peer_addr).await;
                        drop(permit);
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        peer_addr = %peer_addr,
                        max_connections = self.max_connections,
                        "Connection refused: server full"
                    );
                    self.tracker
                        .spawn(refuse(stream, self.context.settings.flush_timeout));
                }
            }
        }
    }
}

/// Errors that affect one pending connection, not the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

async fn refuse(mut stream: TcpStream, flush_timeout: Duration) {
    let notice = ServerMessage::HandshakeReject {
        reason: HandshakeRejectReason::ServerFull,
    };
    let Ok(frame) = encode_frame(&notice) else {
        return;
    };
    let _ = tokio::time::timeout(flush_timeout, async {
        stream.write_all(&frame).await?;
        stream.shutdown().await
    })
    .await;
}
