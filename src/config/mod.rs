//! Configuration for the session-recorder daemon.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Daemon / HTTP server configuration
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ingestion + VAD tuning
    #[serde(default)]
    pub vad: VadConfig,

    /// Speech recognizer subprocess configuration
    #[serde(default)]
    pub recognizer: RecognizerConfig,

    /// WebRTC transport configuration
    #[serde(default)]
    pub webrtc: WebRTCConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address
    pub host: String,

    /// HTTP port
    pub port: u16,

    /// Directory persisted sessions are written under. Each session gets
    /// `<sessions_dir>/<session-id>/`, holding both the CBOR `session` blob
    /// and its tracks' `track-<track-id>.ogg` sibling files (spec.md §3).
    pub sessions_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (error, warn, info, debug, trace)
    pub level: String,

    /// Log format: "plain" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadConfig {
    /// Sample rate the VAD operates at (Hz). Tracks are normalized to this
    /// rate during ingestion.
    pub sample_rate_hz: u32,

    /// Maximum sliding-window duration before a forced final flush (ms).
    pub max_window_ms: u32,

    /// Silence gap required to end an utterance (ms).
    pub vad_gap_ms: u32,

    /// Maximum time a draft flush can stay pending before forcing final (ms).
    pub max_pending_ms: u32,

    /// Mean-square energy threshold above which a frame is "active".
    pub energy_threshold: f32,

    /// Mean-absolute-amplitude threshold below which a frame is "silent".
    pub silence_threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        VadConfig {
            sample_rate_hz: 16_000,
            max_window_ms: 24_000,
            vad_gap_ms: 700,
            max_pending_ms: 500,
            energy_threshold: 0.0005,
            silence_threshold: 0.015,
        }
    }
}

impl From<VadConfig> for crate::vad::VadConfig {
    fn from(cfg: VadConfig) -> Self {
        crate::vad::VadConfig {
            sample_rate_hz: cfg.sample_rate_hz,
            max_window_duration: std::time::Duration::from_millis(cfg.max_window_ms as u64),
            vad_gap_duration: std::time::Duration::from_millis(cfg.vad_gap_ms as u64),
            max_pending: std::time::Duration::from_millis(cfg.max_pending_ms as u64),
            energy_threshold: cfg.energy_threshold,
            silence_threshold: cfg.silence_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Subprocess command to launch
    pub command: String,

    /// Subprocess arguments
    pub args: Vec<String>,

    /// Sample rate the subprocess expects its PCM at
    pub sample_rate_hz: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        let defaults = crate::recognizer::RecognizerConfig::default();
        RecognizerConfig {
            command: defaults.command,
            args: defaults.args,
            sample_rate_hz: defaults.sample_rate_hz,
        }
    }
}

impl From<RecognizerConfig> for crate::recognizer::RecognizerConfig {
    fn from(cfg: RecognizerConfig) -> Self {
        crate::recognizer::RecognizerConfig {
            command: cfg.command,
            args: cfg.args,
            sample_rate_hz: cfg.sample_rate_hz,
        }
    }
}

/// WebRTC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRTCConfig {
    /// Enable WebRTC ingestion (requires the `webrtc-streaming` feature)
    pub enabled: bool,

    /// Force TCP-only ICE behavior
    #[serde(default = "default_tcp_only")]
    pub tcp_only: bool,

    /// Public candidate address (e.g. "1.2.3.4:8008") for ICE-TCP
    #[serde(default)]
    pub public_candidate: Option<String>,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        WebRTCConfig {
            enabled: cfg!(feature = "webrtc-streaming"),
            tcp_only: true,
            public_candidate: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8008,
                sessions_dir: PathBuf::from("/var/lib/sessioncore/sessions"),
            },
            logging: LoggingConfig::default(),
            vad: VadConfig::default(),
            recognizer: RecognizerConfig::default(),
            webrtc: WebRTCConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file, falling back to defaults if
    /// the file doesn't exist.
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".into());
        }

        if self.vad.sample_rate_hz == 0 {
            return Err("vad.sample_rate_hz must be non-zero".into());
        }
        if self.vad.max_pending_ms > self.vad.max_window_ms {
            return Err("vad.max_pending_ms cannot exceed vad.max_window_ms".into());
        }

        if self.recognizer.command.trim().is_empty() {
            return Err("recognizer.command must not be empty".into());
        }
        if self.recognizer.sample_rate_hz == 0 {
            return Err("recognizer.sample_rate_hz must be non-zero".into());
        }

        if self.webrtc.enabled && !cfg!(feature = "webrtc-streaming") {
            return Err("webrtc.enabled requires the webrtc-streaming feature".into());
        }
        if let Some(ref candidate) = self.webrtc.public_candidate {
            if candidate.parse::<std::net::SocketAddr>().is_err() {
                return Err("webrtc.public_candidate must be in ip:port format".into());
            }
        }

        Ok(())
    }
}

fn default_tcp_only() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn validate_rejects_zero_port() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_pending_longer_than_window() {
        let mut cfg = Config::default();
        cfg.vad.max_pending_ms = cfg.vad.max_window_ms + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}
