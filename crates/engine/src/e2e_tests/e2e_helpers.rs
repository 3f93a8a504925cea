//! Server and client harness for the end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use gamelobby_shared::{
    ClientMessage, EventPayload, FrameCodec, PlayerInfo, ServerMessage, PROTOCOL_VERSION,
};

use crate::infrastructure::auth::DevAuthenticator;
use crate::infrastructure::config::LobbyConfig;
use crate::{LobbyServer, ServerHandle};

/// How long a client waits for any single frame.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// Loopback config with fast heartbeats.
pub fn test_config(heartbeat_timeout: Duration) -> LobbyConfig {
    LobbyConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        handshake_timeout: Duration::from_secs(1),
        flush_timeout: Duration::from_millis(200),
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_timeout,
        ..LobbyConfig::default()
    }
}

pub async fn start_server(config: LobbyConfig) -> ServerHandle {
    LobbyServer::new(config, Arc::new(DevAuthenticator))
        .start()
        .await
        .expect("server starts")
}

/// Poll `condition` until it holds or the receive timeout passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

/// A framed client speaking the lobby protocol.
pub struct TestClient {
    framed: Framed<TcpStream, FrameCodec<ServerMessage>>,
    pub player: PlayerInfo,
    pub session_id: String,
}

impl TestClient {
    /// Connect and complete the handshake under `name`.
    pub async fn connect(addr: SocketAddr, name: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let mut framed = Framed::new(stream, FrameCodec::new());
        framed
            .send(ClientMessage::Handshake {
                protocol_version: PROTOCOL_VERSION,
                auth_token: name.to_string(),
            })
            .await
            .expect("send handshake");

        let reply = tokio::time::timeout(RECV_TIMEOUT, framed.next())
            .await
            .expect("handshake reply in time")
            .expect("connection open")
            .expect("decodable frame");
        match reply {
            ServerMessage::HandshakeAck { player, session_id } => Self {
                framed,
                player,
                session_id,
            },
            other => panic!("handshake failed: {other:?}"),
        }
    }

    pub async fn send(&mut self, message: ClientMessage) {
        self.framed.send(message).await.expect("send");
    }

    /// Next frame, or `None` once the server closed the connection.
    pub async fn try_recv(&mut self) -> Option<ServerMessage> {
        tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("frame in time")
            .map(|frame| frame.expect("decodable frame"))
    }

    pub async fn recv(&mut self) -> ServerMessage {
        self.try_recv().await.expect("connection open")
    }

    /// Next room event as `(seq, sender, payload)`.
    pub async fn recv_event(&mut self) -> (u64, PlayerInfo, EventPayload) {
        match self.recv().await {
            ServerMessage::Event {
                seq,
                sender,
                payload,
                ..
            } => (seq, sender, payload),
            other => panic!("expected event, got {other:?}"),
        }
    }

    /// Wait for the next non-`Pong` frame while sending heartbeats.
    pub async fn recv_keepalive(&mut self, every: Duration) -> ServerMessage {
        tokio::time::timeout(RECV_TIMEOUT, async {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.framed.send(ClientMessage::Heartbeat).await.expect("heartbeat");
                    }
                    frame = self.framed.next() => {
                        match frame.expect("connection open").expect("decodable frame") {
                            ServerMessage::Pong => continue,
                            other => return other,
                        }
                    }
                }
            }
        })
        .await
        .expect("frame in time")
    }

    pub async fn join(&mut self, room: &str) -> ServerMessage {
        self.send(ClientMessage::JoinRoom {
            room: room.to_string(),
        })
        .await;
        self.recv().await
    }

    /// Read until the server closes the connection; returns what arrived.
    pub async fn drain_until_closed(&mut self) -> Vec<ServerMessage> {
        let mut received = Vec::new();
        while let Some(message) = self.try_recv().await {
            received.push(message);
        }
        received
    }
}
