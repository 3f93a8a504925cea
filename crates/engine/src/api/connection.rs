//! Per-connection tasks.
//!
//! Each accepted socket is split. The reader half runs the handshake and
//! then the inbound loop on the connection task; the writer half belongs to
//! a dedicated writer task that drains the session's outbound queue. Nothing
//! else ever writes to the socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use gamelobby_domain::{PlayerIdentity, RoomName};
use gamelobby_shared::{
    ClientMessage, DecodeError, ErrorCode, FrameCodec, HandshakeRejectReason, JoinRejectReason,
    LeaveReason, ServerMessage, PROTOCOL_VERSION,
};

use crate::infrastructure::config::LobbyConfig;
use crate::infrastructure::ports::Authenticator;
use crate::lobby::{BroadcastError, CloseReason, DeliveryReport, Dispatcher, LobbyRegistry, Session};

/// Decodes client frames, encodes server frames.
type ServerCodec = FrameCodec<ClientMessage>;
type FrameReader = FramedRead<OwnedReadHalf, ServerCodec>;
type FrameWriter = FramedWrite<OwnedWriteHalf, ServerCodec>;

/// Per-connection limits and timeouts.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub max_frame_bytes: usize,
    pub handshake_timeout: Duration,
    pub outbound_capacity: usize,
    pub flush_timeout: Duration,
}

impl From<&LobbyConfig> for ConnectionSettings {
    fn from(config: &LobbyConfig) -> Self {
        Self {
            max_frame_bytes: config.max_frame_bytes,
            handshake_timeout: config.handshake_timeout,
            outbound_capacity: config.outbound_capacity,
            flush_timeout: config.flush_timeout,
        }
    }
}

/// Everything a connection task needs.
pub struct LobbyContext {
    pub registry: Arc<LobbyRegistry>,
    pub dispatcher: Dispatcher,
    pub authenticator: Arc<dyn Authenticator>,
    pub settings: ConnectionSettings,
    pub shutdown: CancellationToken,
}

/// Serve one accepted connection until it closes.
pub async fn handle_connection(ctx: Arc<LobbyContext>, stream: TcpStream, peer_addr: SocketAddr) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(
        read_half,
        ServerCodec::with_max_frame_len(ctx.settings.max_frame_bytes),
    );
    let mut writer = FramedWrite::new(write_half, ServerCodec::new());

    let outcome = tokio::select! {
        _ = ctx.shutdown.cancelled() => return,
        outcome = tokio::time::timeout(ctx.settings.handshake_timeout, handshake(&ctx, &mut reader)) => outcome,
    };
    let identity = match outcome {
        Ok(Ok(identity)) => identity,
        Ok(Err(reason)) => {
            reject(&mut writer, peer_addr, reason, ctx.settings.flush_timeout).await;
            return;
        }
        Err(_) => {
            reject(
                &mut writer,
                peer_addr,
                HandshakeRejectReason::ExpectedHandshake,
                ctx.settings.flush_timeout,
            )
            .await;
            return;
        }
    };

    let session = Arc::new(Session::new(
        identity,
        peer_addr,
        ctx.settings.outbound_capacity,
        Arc::downgrade(&ctx.registry),
    ));
    if let Err(e) = ctx.registry.register(Arc::clone(&session)) {
        tracing::warn!(session_id = %session.id(), error = %e, "Session registration failed");
        return;
    }
    let _ = session.send(ServerMessage::HandshakeAck {
        player: session.player_info(),
        session_id: session.id().to_string(),
    });
    if ctx.shutdown.is_cancelled() {
        session.close(CloseReason::Shutdown);
    }

    let writer_task = tokio::spawn(write_loop(
        Arc::clone(&session),
        writer,
        ctx.settings.flush_timeout,
    ));
    read_loop(&ctx, &session, &mut reader).await;
    session.close(CloseReason::PeerClosed);

    if let Err(e) = writer_task.await {
        tracing::error!(session_id = %session.id(), error = %e, "Writer task failed");
    }
    tracing::info!(
        session_id = %session.id(),
        peer_addr = %peer_addr,
        reason = ?session.close_reason(),
        "Connection closed"
    );
}

/// Wait for the first frame and authenticate it.
async fn handshake(
    ctx: &LobbyContext,
    reader: &mut FrameReader,
) -> Result<PlayerIdentity, HandshakeRejectReason> {
    let (protocol_version, auth_token) = match reader.next().await {
        Some(Ok(ClientMessage::Handshake {
            protocol_version,
            auth_token,
        })) => (protocol_version, auth_token),
        Some(Ok(other)) => {
            tracing::debug!(kind = other.kind(), "Expected handshake");
            return Err(HandshakeRejectReason::ExpectedHandshake);
        }
        Some(Err(e)) => {
            tracing::debug!(error = %e, "Undecodable handshake");
            return Err(HandshakeRejectReason::ExpectedHandshake);
        }
        None => return Err(HandshakeRejectReason::ExpectedHandshake),
    };

    if protocol_version != PROTOCOL_VERSION {
        return Err(HandshakeRejectReason::UnsupportedVersion {
            server_version: PROTOCOL_VERSION,
        });
    }
    ctx.authenticator
        .authenticate(&auth_token)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, "Authentication failed");
            HandshakeRejectReason::InvalidCredentials
        })
}

/// Best-effort rejection; the connection is dropped either way.
async fn reject(
    writer: &mut FrameWriter,
    peer_addr: SocketAddr,
    reason: HandshakeRejectReason,
    flush_timeout: Duration,
) {
    tracing::warn!(peer_addr = %peer_addr, reason = ?reason, "Handshake rejected");
    let notice = ServerMessage::HandshakeReject { reason };
    let _ = tokio::time::timeout(flush_timeout, async {
        writer.send(&notice).await?;
        writer.get_mut().shutdown().await
    })
    .await;
}

async fn read_loop(ctx: &LobbyContext, session: &Arc<Session>, reader: &mut FrameReader) {
    loop {
        let frame = tokio::select! {
            _ = session.cancelled() => return,
            frame = reader.next() => frame,
        };
        match frame {
            None => {
                tracing::debug!(session_id = %session.id(), "Peer closed connection");
                return;
            }
            Some(Err(DecodeError::Io(e))) => {
                tracing::debug!(session_id = %session.id(), error = %e, "Connection read failed");
                return;
            }
            Some(Err(e)) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Undecodable frame");
                session.close(CloseReason::ProtocolError);
                return;
            }
            Some(Ok(message)) => {
                session.touch();
                if let Some(reply) = handle_message(ctx, session, message) {
                    let _ = session.send(reply);
                }
            }
        }
    }
}

/// Apply one inbound message. Returns the direct reply, if it is not
/// already queued by the registry or dispatcher.
pub(crate) fn handle_message(
    ctx: &LobbyContext,
    session: &Arc<Session>,
    message: ClientMessage,
) -> Option<ServerMessage> {
    tracing::debug!(session_id = %session.id(), kind = message.kind(), "Message received");

    match message {
        ClientMessage::Handshake { .. } => Some(ServerMessage::error(
            ErrorCode::AlreadyHandshaken,
            "handshake already completed",
        )),
        ClientMessage::JoinRoom { room } => {
            let name = match RoomName::new(room.clone()) {
                Ok(name) => name,
                Err(e) => {
                    return Some(ServerMessage::JoinReject {
                        room,
                        reason: JoinRejectReason::InvalidRoomName {
                            message: e.to_string(),
                        },
                    })
                }
            };
            match ctx.registry.join(session, name) {
                // The registry queued the JoinAck under the room lock.
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(session_id = %session.id(), room = %room, error = %e, "Join rejected");
                    Some(ServerMessage::JoinReject {
                        room,
                        reason: e.reject_reason(),
                    })
                }
            }
        }
        ClientMessage::LeaveRoom => {
            ctx.registry.leave(session, LeaveReason::Left);
            Some(ServerMessage::LeaveAck)
        }
        ClientMessage::Chat { body } => broadcast_reply(ctx.dispatcher.chat(session, body)),
        ClientMessage::ReadyState { ready } => {
            broadcast_reply(ctx.dispatcher.set_ready(session, ready))
        }
        ClientMessage::StartSignal => broadcast_reply(ctx.dispatcher.start(session)),
        ClientMessage::SetPresence { status } => {
            ctx.dispatcher.set_presence(session, status);
            Some(ServerMessage::PresenceAck { status })
        }
        ClientMessage::ListRooms => Some(ServerMessage::RoomList {
            rooms: ctx.registry.list_rooms(),
        }),
        ClientMessage::Heartbeat => Some(ServerMessage::Pong),
        ClientMessage::Unknown => Some(ServerMessage::error(
            ErrorCode::UnknownMessage,
            "unknown message type",
        )),
    }
}

/// A successful broadcast needs no reply: the sender's copy of the event is it.
fn broadcast_reply(result: Result<DeliveryReport, BroadcastError>) -> Option<ServerMessage> {
    match result {
        Ok(_) => None,
        Err(BroadcastError::NotInRoom) => Some(ServerMessage::error(
            ErrorCode::NotInRoom,
            "join a room first",
        )),
        Err(BroadcastError::NotAuthorized(message)) => {
            Some(ServerMessage::error(ErrorCode::NotAuthorized, message))
        }
        Err(BroadcastError::InvalidMessage(message)) => {
            Some(ServerMessage::error(ErrorCode::InvalidMessage, message))
        }
        // RoomClosed was already sent; a closing session gets nothing.
        Err(BroadcastError::RoomClosed(_)) | Err(BroadcastError::NotActive) => None,
    }
}

async fn write_loop(session: Arc<Session>, mut writer: FrameWriter, flush_timeout: Duration) {
    let outcome = tokio::select! {
        result = pump_outbound(&session, &mut writer) => result,
        _ = flush_deadline(&session, flush_timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "outbound flush timed out",
        )),
    };
    if let Err(e) = outcome {
        tracing::debug!(session_id = %session.id(), error = %e, "Writer stopped");
        session.close(CloseReason::PeerClosed);
    }
}

/// Resolves `flush_timeout` after the session starts closing.
async fn flush_deadline(session: &Session, flush_timeout: Duration) {
    session.cancelled().await;
    tokio::time::sleep(flush_timeout).await;
}

/// Write queued messages until the queue is closed and drained.
async fn pump_outbound(session: &Session, writer: &mut FrameWriter) -> io::Result<()> {
    loop {
        let batch = session.outbound().drain();
        if batch.overflowed {
            tracing::warn!(
                session_id = %session.id(),
                capacity = session.outbound().capacity(),
                "Outbound queue overflowed"
            );
            session.close(CloseReason::SlowConsumer);
        }

        if !batch.messages.is_empty() {
            for message in &batch.messages {
                writer.feed(message.as_ref()).await?;
            }
            SinkExt::<&ServerMessage>::flush(writer).await?;
        }
        if batch.closed {
            return writer.get_mut().shutdown().await;
        }
        session.outbound().notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::auth::DevAuthenticator;
    use crate::lobby::test_support::{connect, drain, room};
    use crate::lobby::RegistryConfig;
    use gamelobby_domain::PresenceStatus;
    use gamelobby_shared::RoomSummary;

    fn context() -> LobbyContext {
        let registry = Arc::new(LobbyRegistry::new(RegistryConfig::default()));
        LobbyContext {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            authenticator: Arc::new(DevAuthenticator),
            settings: ConnectionSettings::from(&LobbyConfig::default()),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn spawned_writer_flushes_queue_then_notice() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let client = TcpStream::connect(listener.local_addr().expect("addr"))
            .await
            .expect("connect");
        let (server, _) = listener.accept().await.expect("accept");
        let (_read_half, write_half) = server.into_split();

        let ctx = context();
        let ada = connect(&ctx.registry, "Ada");
        drain(&ada);
        let writer = tokio::spawn(write_loop(
            Arc::clone(&ada),
            FramedWrite::new(write_half, ServerCodec::new()),
            Duration::from_secs(1),
        ));

        ada.send(ServerMessage::Pong).expect("send");
        ada.send(ServerMessage::LeaveAck).expect("send");
        ada.close(CloseReason::Kicked);
        writer.await.expect("writer task");

        let mut frames = FramedRead::new(client, FrameCodec::<ServerMessage>::new());
        let mut received = Vec::new();
        while let Some(frame) = frames.next().await {
            received.push(frame.expect("decodable frame"));
        }
        assert_eq!(
            received,
            vec![
                ServerMessage::Pong,
                ServerMessage::LeaveAck,
                ServerMessage::Disconnect {
                    reason: gamelobby_shared::DisconnectReason::Kicked
                },
            ]
        );
    }

    #[test]
    fn join_replies_come_from_the_registry() {
        let ctx = context();
        let a = connect(&ctx.registry, "Ada");

        let reply = handle_message(&ctx, &a, ClientMessage::JoinRoom { room: "alpha".into() });
        assert_eq!(reply, None);
        assert!(matches!(drain(&a).as_slice(), [ServerMessage::JoinAck { .. }]));

        let reply = handle_message(&ctx, &a, ClientMessage::JoinRoom { room: "beta".into() });
        assert_eq!(
            reply,
            Some(ServerMessage::JoinReject {
                room: "beta".to_string(),
                reason: JoinRejectReason::IdentityAlreadyInRoom {
                    room: "alpha".to_string()
                },
            })
        );
    }

    #[test]
    fn invalid_room_name_is_rejected() {
        let ctx = context();
        let a = connect(&ctx.registry, "Ada");
        let reply = handle_message(&ctx, &a, ClientMessage::JoinRoom { room: String::new() });
        assert!(matches!(
            reply,
            Some(ServerMessage::JoinReject {
                reason: JoinRejectReason::InvalidRoomName { .. },
                ..
            })
        ));
        assert_eq!(ctx.registry.room_count(), 0);
    }

    #[test]
    fn every_control_message_gets_one_reply() {
        let ctx = context();
        let a = connect(&ctx.registry, "Ada");

        assert_eq!(handle_message(&ctx, &a, ClientMessage::Heartbeat), Some(ServerMessage::Pong));
        assert_eq!(handle_message(&ctx, &a, ClientMessage::LeaveRoom), Some(ServerMessage::LeaveAck));
        assert_eq!(
            handle_message(
                &ctx,
                &a,
                ClientMessage::SetPresence {
                    status: PresenceStatus::Spectating
                }
            ),
            Some(ServerMessage::PresenceAck {
                status: PresenceStatus::Spectating
            })
        );
        assert!(matches!(
            handle_message(&ctx, &a, ClientMessage::Unknown),
            Some(ServerMessage::Error {
                code: ErrorCode::UnknownMessage,
                ..
            })
        ));
        assert!(matches!(
            handle_message(
                &ctx,
                &a,
                ClientMessage::Handshake {
                    protocol_version: PROTOCOL_VERSION,
                    auth_token: "Ada".into()
                }
            ),
            Some(ServerMessage::Error {
                code: ErrorCode::AlreadyHandshaken,
                ..
            })
        ));
        assert!(matches!(
            handle_message(&ctx, &a, ClientMessage::Chat { body: "hi".into() }),
            Some(ServerMessage::Error {
                code: ErrorCode::NotInRoom,
                ..
            })
        ));
    }

    #[test]
    fn list_rooms_reports_snapshot() {
        let ctx = context();
        let a = connect(&ctx.registry, "Ada");
        ctx.registry.join(&a, room("alpha")).expect("join");

        assert_eq!(
            handle_message(&ctx, &a, ClientMessage::ListRooms),
            Some(ServerMessage::RoomList {
                rooms: vec![RoomSummary {
                    room: "alpha".to_string(),
                    member_count: 1
                }]
            })
        );
    }

    #[test]
    fn chat_echo_is_the_reply() {
        let ctx = context();
        let a = connect(&ctx.registry, "Ada");
        ctx.registry.join(&a, room("alpha")).expect("join");
        drain(&a);

        assert_eq!(handle_message(&ctx, &a, ClientMessage::Chat { body: "hi".into() }), None);
        assert!(matches!(drain(&a).as_slice(), [ServerMessage::Event { seq: 0, .. }]));
    }
}
