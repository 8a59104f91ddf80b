//! WebRTC signaling over a WebSocket: SDP offer/answer and ICE candidate
//! exchange against a session's `SessionManager`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::webrtc::{SessionManager, SignalingMessage};

/// Signaling server configuration.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// WebSocket endpoint path.
    pub path: String,
    /// Ping interval in seconds.
    pub ping_interval_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        SignalingConfig {
            path: "/webrtc".to_string(),
            ping_interval_secs: 30,
        }
    }
}

/// Drives one client's signaling WebSocket against `session_manager` until
/// it closes, then tears down the WebRTC session it negotiated (if any).
/// The timeline session itself outlives the socket.
pub async fn handle_signaling_connection(socket: WebSocket, session_manager: Arc<SessionManager>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session_id: Option<String> = None;

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let text_str: &str = text.as_ref();
                match SignalingMessage::from_json(text_str) {
                    Ok(msg) => {
                        if let Some(response) =
                            handle_signaling_message(msg, &mut session_id, &session_manager, &tx).await
                        {
                            let _ = tx.send(response);
                        }
                    }
                    Err(e) => {
                        warn!("invalid signaling message: {}", e);
                        let error = SignalingMessage::error("PARSE_ERROR", &e.to_string(), session_id.clone());
                        if let Ok(json) = error.to_json() {
                            let _ = tx.send(json);
                        }
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("ignoring binary message on signaling channel");
            }
            Ok(Message::Close(_)) => {
                info!("signaling connection closed");
                break;
            }
            Err(e) => {
                error!("signaling websocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    if let Some(id) = session_id {
        session_manager.remove_session(&id).await;
        info!("cleaned up webrtc session {}", id);
    }
    send_task.abort();
}

async fn handle_signaling_message(
    message: SignalingMessage,
    session_id: &mut Option<String>,
    session_manager: &Arc<SessionManager>,
    tx: &mpsc::UnboundedSender<String>,
) -> Option<String> {
    match message {
        SignalingMessage::Offer {
            sdp,
            session_id: provided,
        } => {
            let session = if let Some(ref id) = *session_id {
                session_manager.get_session(id)
            } else {
                match session_manager.create_session().await {
                    Ok(s) => {
                        *session_id = Some(s.id.as_str().to_string());
                        Some(s)
                    }
                    Err(e) => {
                        error!("failed to create session: {}", e);
                        let error = SignalingMessage::error("SESSION_ERROR", &e.to_string(), provided);
                        return error.to_json().ok();
                    }
                }
            };

            let Some(session) = session else {
                let error = SignalingMessage::error("SESSION_NOT_FOUND", "session not found", session_id.clone());
                return error.to_json().ok();
            };

            match session_manager.handle_offer(session.id.as_str(), &sdp).await {
                Ok(answer_sdp) => {
                    let answer = SignalingMessage::answer(answer_sdp, session.id.as_str().to_string());
                    let ready = SignalingMessage::Ready {
                        session_id: session.id.as_str().to_string(),
                    };
                    if let Ok(json) = ready.to_json() {
                        let _ = tx.send(json);
                    }
                    answer.to_json().ok()
                }
                Err(e) => {
                    error!("failed to handle offer: {}", e);
                    let error = SignalingMessage::error("OFFER_ERROR", &e.to_string(), Some(session.id.as_str().to_string()));
                    error.to_json().ok()
                }
            }
        }

        SignalingMessage::IceCandidate {
            candidate,
            sdp_mid,
            sdp_mline_index,
            session_id: msg_session_id,
        } => {
            let target = session_id.clone().unwrap_or(msg_session_id);
            if let Err(e) = session_manager
                .add_ice_candidate(&target, &candidate, sdp_mid.as_deref(), sdp_mline_index)
                .await
            {
                warn!("failed to add ice candidate: {}", e);
            }
            None
        }

        SignalingMessage::Ping { timestamp } => SignalingMessage::Pong { timestamp }.to_json().ok(),

        SignalingMessage::Close {
            session_id: msg_session_id,
            reason,
        } => {
            let target = session_id.clone().unwrap_or(msg_session_id);
            info!("session close requested: {} (reason: {:?})", target, reason);
            session_manager.remove_session(&target).await;
            *session_id = None;
            None
        }

        _ => {
            debug!("unhandled signaling message variant");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_config_default_path_is_webrtc() {
        let config = SignalingConfig::default();
        assert_eq!(config.path, "/webrtc");
        assert_eq!(config.ping_interval_secs, 30);
    }
}
