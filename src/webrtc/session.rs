//! Bridges accepted WebRTC peer connections to the timeline model: each
//! remote audio track becomes a `timeline::Track`, fed by the ingestion
//! pipeline in `crate::ingest`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_remote::TrackRemote;

use super::peer_connection::PeerConnectionManager;
use super::WebRTCError;
use crate::config::WebRTCConfig;
use crate::ingest::{self, remote::spawn_reader};
use crate::store;
use crate::timeline::{Id, Session};
use crate::web::state::AppState;

/// One active WebRTC session: the timeline session it feeds and the peer
/// connection negotiating its media.
pub struct WebRTCSession {
    pub id: Id,
    pub timeline: Arc<Session>,
    pub peer_connection: Arc<RTCPeerConnection>,
}

/// Owns every active peer connection and wires each one's remote tracks
/// into the ingestion pipeline on arrival.
pub struct SessionManager {
    app_state: Arc<AppState>,
    peer_manager: PeerConnectionManager,
    sessions: Mutex<HashMap<String, Arc<WebRTCSession>>>,
    /// Root of the `sessions/<session-id>/` layout (spec.md §3); the Ogg tee
    /// writes `track-<track-id>.ogg` as a sibling of that session's `session`
    /// blob, same as `store::save`.
    sessions_dir: PathBuf,
}

impl SessionManager {
    pub fn new(app_state: Arc<AppState>, webrtc_config: WebRTCConfig, sessions_dir: PathBuf) -> Arc<Self> {
        Arc::new(SessionManager {
            app_state,
            peer_manager: PeerConnectionManager::new(webrtc_config),
            sessions: Mutex::new(HashMap::new()),
            sessions_dir,
        })
    }

    pub async fn create_session(&self) -> Result<Arc<WebRTCSession>, WebRTCError> {
        let entry = self.app_state.create_session();
        let pc = self.peer_manager.create_peer_connection().await?;

        let timeline = entry.session.clone();
        let sessions_dir = self.sessions_dir.clone();
        PeerConnectionManager::setup_track_callback(&pc, move |track| {
            let timeline = timeline.clone();
            let sessions_dir = sessions_dir.clone();
            tokio::spawn(async move {
                handle_remote_track(timeline, track, sessions_dir).await;
            });
        })
        .await;

        let session = Arc::new(WebRTCSession {
            id: entry.session.id.clone(),
            timeline: entry.session.clone(),
            peer_connection: pc,
        });
        self.sessions
            .lock()
            .insert(session.id.as_str().to_string(), session.clone());
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Option<Arc<WebRTCSession>> {
        self.sessions.lock().get(id).cloned()
    }

    pub async fn handle_offer(&self, id: &str, sdp: &str) -> Result<String, WebRTCError> {
        let session = self
            .get_session(id)
            .ok_or_else(|| WebRTCError::SessionNotFound(id.to_string()))?;
        PeerConnectionManager::handle_offer(&session.peer_connection, sdp).await
    }

    pub async fn add_ice_candidate(
        &self,
        id: &str,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u16>,
    ) -> Result<(), WebRTCError> {
        let session = self
            .get_session(id)
            .ok_or_else(|| WebRTCError::SessionNotFound(id.to_string()))?;
        PeerConnectionManager::add_ice_candidate(&session.peer_connection, candidate, sdp_mid, sdp_mline_index).await
    }

    pub async fn remove_session(&self, id: &str) {
        let removed = self.sessions.lock().remove(id);
        if let Some(session) = removed {
            if let Err(e) = PeerConnectionManager::close(&session.peer_connection).await {
                warn!("session {}: error closing peer connection: {}", id, e);
            }
        }
    }
}

async fn handle_remote_track(timeline: Arc<Session>, track: Arc<TrackRemote>, sessions_dir: PathBuf) {
    let format = ingest::ingestion_format();
    let timeline_track = timeline.new_track(format);
    info!(
        "session {}: accepted remote track {} -> timeline track {}",
        timeline.id,
        track.id(),
        timeline_track.id
    );

    let source = spawn_reader(track.clone());

    // `track-<id>.ogg` lives as a sibling of the `session` blob in
    // `sessions/<session-id>/`, per spec.md §3/§4.C.
    let session_dir = match store::ensure_session_dir(&sessions_dir, &timeline.id) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("session {}: could not create session dir: {}", timeline.id, e);
            sessions_dir.join(timeline.id.as_str())
        }
    };
    let ogg_path = session_dir.join(format!("track-{}.ogg", timeline_track.id));
    let sink: Box<dyn std::io::Write + Send> = match std::fs::File::create(&ogg_path) {
        Ok(file) => Box::new(file),
        Err(e) => {
            warn!("session {}: could not open {:?}: {}", timeline.id, ogg_path, e);
            Box::new(std::io::sink())
        }
    };
    let tee = ingest::OpusOggTee::new(sink, 1, format.channels as u8, format.sample_rate_hz);
    let source = ingest::TeeingSource::new(source, tee);

    tokio::task::spawn_blocking(move || match ingest::TrackStreamer::new(source, format) {
        Ok(streamer) => ingest::drive(timeline_track, streamer),
        Err(e) => error!("session {}: failed to build track streamer: {}", timeline.id, e),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_manager_starts_with_no_sessions() {
        // Smoke test for the registry itself; building a real SessionManager
        // requires a tokio runtime and an AppState, exercised in
        // integration tests instead.
        let sessions: HashMap<String, Arc<WebRTCSession>> = HashMap::new();
        assert!(sessions.is_empty());
    }
}
