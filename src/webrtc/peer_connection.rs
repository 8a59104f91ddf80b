//! WebRTC PeerConnection management, trimmed to what audio-only ingestion
//! needs: Opus codec negotiation and an `on_track` hook that feeds a remote
//! track into the ingestion pipeline.

#![allow(dead_code)]

use super::WebRTCError;
use crate::config::WebRTCConfig;
use log::info;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::track::track_remote::TrackRemote;

pub type StateChangeCallback = Box<dyn Fn(RTCPeerConnectionState) + Send + Sync>;
pub type TrackCallback = Box<dyn Fn(Arc<TrackRemote>) + Send + Sync>;

/// Builds audio-only `RTCPeerConnection`s for one session's remote tracks.
pub struct PeerConnectionManager {
    config: WebRTCConfig,
}

impl PeerConnectionManager {
    pub fn new(config: WebRTCConfig) -> Self {
        PeerConnectionManager { config }
    }

    pub async fn create_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, WebRTCError> {
        let mut setting_engine = SettingEngine::default();
        if self.config.tcp_only {
            info!("webrtc: tcp-only ICE requested; relying on webrtc-rs defaults");
        }
        let _ = &mut setting_engine;

        let mut media_engine = MediaEngine::default();
        self.register_opus(&mut media_engine)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| WebRTCError::ConnectionFailed(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let rtc_config = RTCConfiguration::default();
        let peer_connection = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| WebRTCError::ConnectionFailed(format!("failed to create peer connection: {}", e)))?;

        Ok(Arc::new(peer_connection))
    }

    fn register_opus(&self, media_engine: &mut MediaEngine) -> Result<(), WebRTCError> {
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_OPUS.to_string(),
                        clock_rate: 48_000,
                        channels: 2,
                        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                        rtcp_feedback: vec![],
                    },
                    payload_type: 111,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )
            .map_err(|e| WebRTCError::ConnectionFailed(format!("failed to register opus: {}", e)))
    }

    pub async fn setup_state_callback(
        peer_connection: &Arc<RTCPeerConnection>,
        callback: impl Fn(RTCPeerConnectionState) + Send + Sync + 'static,
    ) {
        let callback = Arc::new(callback);
        peer_connection.on_peer_connection_state_change(Box::new(move |state| {
            let callback = callback.clone();
            Box::pin(async move {
                callback(state);
            })
        }));
    }

    /// Registers a callback invoked once per accepted remote audio track.
    pub async fn setup_track_callback(
        peer_connection: &Arc<RTCPeerConnection>,
        callback: impl Fn(Arc<TrackRemote>) + Send + Sync + 'static,
    ) {
        let callback = Arc::new(callback);
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let callback = callback.clone();
            Box::pin(async move {
                callback(track);
            })
        }));
    }

    pub async fn handle_offer(
        peer_connection: &Arc<RTCPeerConnection>,
        sdp: &str,
    ) -> Result<String, WebRTCError> {
        let offer = RTCSessionDescription::offer(sdp.to_string())
            .map_err(|e| WebRTCError::SdpError(format!("invalid sdp offer: {}", e)))?;

        peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("failed to set remote description: {}", e)))?;

        let answer = peer_connection
            .create_answer(None)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("failed to create answer: {}", e)))?;

        let mut gather_complete = peer_connection.gathering_complete_promise().await;

        peer_connection
            .set_local_description(answer.clone())
            .await
            .map_err(|e| WebRTCError::SdpError(format!("failed to set local description: {}", e)))?;

        let _ = gather_complete.recv().await;

        if let Some(local_desc) = peer_connection.local_description().await {
            return Ok(local_desc.sdp);
        }
        Ok(answer.sdp)
    }

    pub async fn add_ice_candidate(
        peer_connection: &Arc<RTCPeerConnection>,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u16>,
    ) -> Result<(), WebRTCError> {
        let candidate_init = RTCIceCandidateInit {
            candidate: candidate.to_string(),
            sdp_mid: sdp_mid.map(|s| s.to_string()),
            sdp_mline_index,
            username_fragment: None,
        };

        peer_connection
            .add_ice_candidate(candidate_init)
            .await
            .map_err(|e| WebRTCError::IceError(format!("failed to add ice candidate: {}", e)))
    }

    pub async fn close(peer_connection: &Arc<RTCPeerConnection>) -> Result<(), WebRTCError> {
        peer_connection
            .close()
            .await
            .map_err(|e| WebRTCError::ConnectionFailed(format!("failed to close connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebRTCConfig;

    #[tokio::test]
    async fn peer_connection_manager_negotiates_opus() {
        let config = WebRTCConfig::default();
        let manager = PeerConnectionManager::new(config);
        let pc = manager.create_peer_connection().await.unwrap();
        PeerConnectionManager::close(&pc).await.unwrap();
    }
}
