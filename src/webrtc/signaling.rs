//! WebRTC signaling protocol: SDP offer/answer and ICE candidate exchange
//! over the same WebSocket used to push session data.

use super::WebRTCError;
use serde::{Deserialize, Serialize};

/// Signaling message types for WebRTC negotiation. Trimmed to what an
/// audio-only ingestion peer needs: no video codec or bitrate negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// SDP offer from the client.
    Offer {
        sdp: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// SDP answer from the server.
    Answer { sdp: String, session_id: String },

    /// ICE candidate, either direction.
    IceCandidate {
        candidate: String,
        #[serde(rename = "sdpMid")]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex")]
        sdp_mline_index: Option<u16>,
        session_id: String,
    },

    /// ICE gathering complete (empty candidate).
    IceComplete { session_id: String },

    /// Session ready notification.
    Ready { session_id: String },

    /// Error response.
    Error {
        code: String,
        message: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    Ping { timestamp: u64 },
    Pong { timestamp: u64 },

    /// Close session.
    Close {
        session_id: String,
        reason: Option<String>,
    },
}

impl SignalingMessage {
    pub fn from_json(json: &str) -> Result<Self, WebRTCError> {
        serde_json::from_str(json)
            .map_err(|e| WebRTCError::SdpError(format!("invalid signaling message: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, WebRTCError> {
        serde_json::to_string(self)
            .map_err(|e| WebRTCError::SdpError(format!("failed to serialize message: {}", e)))
    }

    pub fn error(code: &str, message: &str, session_id: Option<String>) -> Self {
        SignalingMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
            session_id,
        }
    }

    pub fn answer(sdp: String, session_id: String) -> Self {
        SignalingMessage::Answer { sdp, session_id }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            SignalingMessage::Offer { session_id, .. } => session_id.as_deref(),
            SignalingMessage::Answer { session_id, .. } => Some(session_id),
            SignalingMessage::IceCandidate { session_id, .. } => Some(session_id),
            SignalingMessage::IceComplete { session_id } => Some(session_id),
            SignalingMessage::Ready { session_id } => Some(session_id),
            SignalingMessage::Error { session_id, .. } => session_id.as_deref(),
            SignalingMessage::Close { session_id, .. } => Some(session_id),
            SignalingMessage::Ping { .. } | SignalingMessage::Pong { .. } => None,
        }
    }
}

/// Handler trait for processing signaling messages off a transport.
pub trait SignalingHandler: Send + Sync {
    fn handle_message(&self, message: SignalingMessage) -> Option<SignalingMessage>;
    fn on_connected(&self, client_id: &str);
    fn on_disconnected(&self, client_id: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_offer() {
        let json = r#"{"type": "offer", "sdp": "v=0\r\n..."}"#;
        let msg = SignalingMessage::from_json(json).unwrap();
        match msg {
            SignalingMessage::Offer { sdp, .. } => assert!(sdp.starts_with("v=0")),
            _ => panic!("expected Offer"),
        }
    }

    #[test]
    fn serializes_answer_with_session_id() {
        let msg = SignalingMessage::answer("v=0...".to_string(), "session123".to_string());
        let json = msg.to_json().unwrap();
        assert!(json.contains("answer"));
        assert!(json.contains("session123"));
    }
}
