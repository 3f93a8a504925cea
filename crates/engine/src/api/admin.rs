//! Admin HTTP routes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use gamelobby_domain::{PresenceStatus, RoomName, SessionId};
use gamelobby_shared::{PlayerInfo, RoomSummary};

use crate::lobby::{CloseReason, LobbyRegistry, RoomSnapshot, Session};

/// Create all admin routes.
pub fn routes() -> Router<Arc<LobbyRegistry>> {
    Router::new()
        .route("/health", get(health))
        .route("/admin/rooms", get(list_rooms))
        .route("/admin/rooms/{name}", get(get_room).delete(close_room))
        .route("/admin/sessions", get(list_sessions))
        .route("/admin/sessions/{id}", delete(kick_session))
}

/// Routes with tracing and state applied.
pub fn router(registry: Arc<LobbyRegistry>) -> Router {
    routes()
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(registry)
}

/// Serve the admin surface until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<LobbyRegistry>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    tracing::info!(addr = ?addr, "Admin server listening");
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn health() -> &'static str {
    "OK"
}

async fn list_rooms(State(registry): State<Arc<LobbyRegistry>>) -> Json<Vec<RoomSummary>> {
    Json(registry.list_rooms())
}

fn parse_room(name: String) -> Result<RoomName, ApiError> {
    RoomName::new(name).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn get_room(
    State(registry): State<Arc<LobbyRegistry>>,
    Path(name): Path<String>,
) -> Result<Json<RoomSnapshot>, ApiError> {
    let name = parse_room(name)?;
    let snapshot = registry.room_snapshot(&name).ok_or(ApiError::NotFound)?;
    Ok(Json(snapshot))
}

#[derive(Debug, Serialize)]
struct ClosedRoom {
    room: RoomName,
    evicted: usize,
}

async fn close_room(
    State(registry): State<Arc<LobbyRegistry>>,
    Path(name): Path<String>,
) -> Result<Json<ClosedRoom>, ApiError> {
    let name = parse_room(name)?;
    let evicted = registry.close_room(&name).ok_or(ApiError::NotFound)?;
    Ok(Json(ClosedRoom {
        room: name,
        evicted,
    }))
}

#[derive(Debug, Serialize)]
struct SessionView {
    session_id: SessionId,
    player: PlayerInfo,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    room: Option<RoomName>,
    presence: PresenceStatus,
    state: &'static str,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            player: session.player_info(),
            peer_addr: session.peer_addr(),
            connected_at: session.connected_at(),
            room: session.current_room(),
            presence: session.presence(),
            state: session.state().as_str(),
        }
    }
}

async fn list_sessions(State(registry): State<Arc<LobbyRegistry>>) -> Json<Vec<SessionView>> {
    let mut sessions: Vec<SessionView> = registry
        .sessions()
        .iter()
        .map(|session| SessionView::from(session.as_ref()))
        .collect();
    sessions.sort_by_key(|view| view.connected_at);
    Json(sessions)
}

async fn kick_session(
    State(registry): State<Arc<LobbyRegistry>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = registry
        .find_session(SessionId::from_uuid(id))
        .ok_or(ApiError::NotFound)?;
    session.close(CloseReason::Kicked);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        }
    }
}
