//! Application composition: wires the lobby core to its listeners.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::api::{admin, AcceptError, Acceptor, ConnectionSettings, LobbyContext};
use crate::infrastructure::config::LobbyConfig;
use crate::infrastructure::ports::Authenticator;
use crate::lobby::{CloseReason, Dispatcher, HeartbeatMonitor, LobbyRegistry};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Accept(#[from] AcceptError),
    #[error("Acceptor task failed: {0}")]
    Join(#[from] JoinError),
}

/// A configured lobby server, not yet listening.
pub struct LobbyServer {
    config: LobbyConfig,
    registry: Arc<LobbyRegistry>,
    authenticator: Arc<dyn Authenticator>,
}

impl LobbyServer {
    pub fn new(config: LobbyConfig, authenticator: Arc<dyn Authenticator>) -> Self {
        let registry = Arc::new(LobbyRegistry::new(config.registry_config()));
        Self {
            config,
            registry,
            authenticator,
        }
    }

    pub fn registry(&self) -> &Arc<LobbyRegistry> {
        &self.registry
    }

    /// Bind the listeners and spawn the acceptor, heartbeat monitor and
    /// admin server.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let listen_addr = self.config.listen_addr();
        let listener = bind(&listen_addr).await?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: listen_addr.clone(),
            source,
        })?;

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let context = Arc::new(LobbyContext {
            registry: Arc::clone(&self.registry),
            dispatcher: Dispatcher::new(Arc::clone(&self.registry)),
            authenticator: self.authenticator,
            settings: ConnectionSettings::from(&self.config),
            shutdown: shutdown.clone(),
        });

        let acceptor = Acceptor::new(
            listener,
            context,
            self.config.max_connections,
            tracker.clone(),
        );
        let acceptor = tokio::spawn(acceptor.run());

        let mut background = Vec::new();
        let heartbeat = HeartbeatMonitor::new(
            Arc::clone(&self.registry),
            self.config.heartbeat_interval,
            self.config.heartbeat_timeout,
        );
        background.push(tokio::spawn(heartbeat.run(shutdown.clone())));

        let admin_addr = match self.config.admin_addr {
            Some(addr) => {
                let listener = bind(&addr.to_string()).await?;
                let bound = listener.local_addr().ok();
                let registry = Arc::clone(&self.registry);
                let shutdown = shutdown.clone();
                background.push(tokio::spawn(async move {
                    if let Err(e) = admin::serve(listener, registry, shutdown).await {
                        tracing::error!(error = %e, "Admin server failed");
                    }
                }));
                bound
            }
            None => None,
        };

        tracing::info!(
            addr = %local_addr,
            admin_addr = ?admin_addr,
            "Lobby server started"
        );
        Ok(ServerHandle {
            local_addr,
            admin_addr,
            registry: self.registry,
            shutdown,
            tracker,
            acceptor,
            background,
            drain_timeout: self.config.flush_timeout * 2,
        })
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    registry: Arc<LobbyRegistry>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    acceptor: JoinHandle<Result<(), AcceptError>>,
    background: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn registry(&self) -> &Arc<LobbyRegistry> {
        &self.registry
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token fires or the acceptor fails, then close
    /// every session and wait for connections to drain.
    pub async fn wait(self) -> Result<(), ServerError> {
        let mut acceptor = self.acceptor;
        let finished = tokio::select! {
            result = &mut acceptor => Some(result),
            _ = self.shutdown.cancelled() => None,
        };
        self.shutdown.cancel();
        let accept_result = match finished {
            Some(result) => result,
            None => acceptor.await,
        };

        let closed = self.registry.close_all(CloseReason::Shutdown);
        self.tracker.close();
        if tokio::time::timeout(self.drain_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Connections still draining at shutdown"
            );
        }
        for task in self.background {
            let _ = task.await;
        }
        tracing::info!(closed, "Lobby server stopped");

        accept_result??;
        Ok(())
    }

    /// Stop the server and wait for it to wind down.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        self.wait().await
    }
}
