//! HTTP server: session lifecycle and the live CBOR data feed.
//!
//! Routes, per spec:
//! - `POST /sessions` creates a session and redirects to it.
//! - `GET /sessions/:id` serves a placeholder page.
//! - `GET /sessions/:id/data` upgrades to a WebSocket and pushes a
//!   CBOR-encoded snapshot on every debounced update.
//! - `GET /webrtc` (only with the `webrtc-streaming` feature) upgrades to
//!   the signaling WebSocket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use log::{info, warn};
use tokio::net::TcpListener;

use crate::store;
use crate::timeline::Id;
use crate::web::AppState;

#[cfg(feature = "webrtc-streaming")]
use crate::webrtc::SessionManager;
#[cfg(not(feature = "webrtc-streaming"))]
struct SessionManager;

/// Application state handed to every route: the session registry plus,
/// when WebRTC ingestion is compiled in, the manager that owns peer
/// connections.
#[derive(Clone)]
struct ServerState {
    app: Arc<AppState>,
    webrtc: Option<Arc<SessionManager>>,
}

/// Runs the HTTP server until the listener errors or the process is killed.
/// `webrtc` is `None` when the `webrtc-streaming` feature is disabled or
/// the daemon's config turned it off.
pub async fn run_http_server(
    bind: &str,
    app_state: Arc<AppState>,
    webrtc: Option<Arc<SessionManager>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = ServerState { app: app_state, webrtc };

    let mut router = Router::new()
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}", get(session_page_handler))
        .route("/sessions/{id}/data", get(session_data_handler));

    if state.webrtc.is_some() {
        router = router.route("/webrtc", get(signaling_handler));
    }

    let app = router.with_state(state);

    let listener = TcpListener::bind(bind).await?;
    info!("http server listening on {}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn create_session_handler(State(state): State<ServerState>) -> Response {
    let entry = state.app.create_session();
    Redirect::to(&format!("/sessions/{}", entry.session.id)).into_response()
}

async fn session_page_handler(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    match state.app.get(&Id::from(id.clone())) {
        Some(entry) => Html(format!(
            "<!doctype html><title>session {id}</title><p>session {id}, {} track(s). Connect to <code>/sessions/{id}/data</code> for live updates.</p>",
            entry.session.tracks().len(),
            id = id
        ))
        .into_response(),
        None => (StatusCode::NOT_FOUND, "no such session").into_response(),
    }
}

async fn session_data_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(entry) = state.app.get(&Id::from(id.clone())) else {
        return (StatusCode::NOT_FOUND, "no such session").into_response();
    };
    ws.on_upgrade(move |socket| push_session_data(socket, entry))
}

async fn push_session_data(mut socket: WebSocket, entry: Arc<crate::web::state::SessionEntry>) {
    let mut updates = entry.updates.clone();

    if let Err(e) = send_snapshot(&mut socket, &entry.session).await {
        warn!("session {}: failed to send initial data snapshot: {}", entry.session.id, e);
        return;
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Err(e) = send_snapshot(&mut socket, &entry.session).await {
                    warn!("session {}: failed to send data snapshot: {}", entry.session.id, e);
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_snapshot(socket: &mut WebSocket, session: &crate::timeline::Session) -> Result<(), String> {
    let dto = store::to_dto(session).map_err(|e| e.to_string())?;
    let bytes = serde_cbor::to_vec(&dto).map_err(|e| e.to_string())?;
    socket
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| e.to_string())
}

async fn signaling_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    #[cfg(feature = "webrtc-streaming")]
    {
        let Some(manager) = state.webrtc.clone() else {
            return (StatusCode::SERVICE_UNAVAILABLE, "webrtc signaling is disabled").into_response();
        };
        return ws
            .on_upgrade(move |socket| async move {
                crate::transport::handle_signaling_connection(socket, manager).await;
            })
            .into_response();
    }
    #[cfg(not(feature = "webrtc-streaming"))]
    {
        let _ = (state, ws);
        (StatusCode::SERVICE_UNAVAILABLE, "webrtc-streaming feature not compiled in").into_response()
    }
}
