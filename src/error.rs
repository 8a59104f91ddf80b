//! Top-level error type for the composition root. Wraps each subsystem's
//! own error enum rather than flattening them, mirroring how
//! `webrtc::WebRTCError` stays scoped to its own module.

use std::fmt;

use crate::ingest::IngestError;
use crate::recognizer::RecognizerError;
use crate::store::StoreError;
use crate::timeline::{BufferError, EventError};

#[derive(Debug)]
pub enum DaemonError {
    Config(String),
    Event(EventError),
    Buffer(BufferError),
    Store(StoreError),
    Ingest(IngestError),
    Recognizer(RecognizerError),
    Io(std::io::Error),
    #[cfg(feature = "webrtc-streaming")]
    WebRTC(crate::webrtc::WebRTCError),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Config(msg) => write!(f, "configuration error: {}", msg),
            DaemonError::Event(e) => write!(f, "{}", e),
            DaemonError::Buffer(e) => write!(f, "{}", e),
            DaemonError::Store(e) => write!(f, "{}", e),
            DaemonError::Ingest(e) => write!(f, "{}", e),
            DaemonError::Recognizer(e) => write!(f, "{}", e),
            DaemonError::Io(e) => write!(f, "{}", e),
            #[cfg(feature = "webrtc-streaming")]
            DaemonError::WebRTC(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DaemonError {}

impl From<EventError> for DaemonError {
    fn from(e: EventError) -> Self {
        DaemonError::Event(e)
    }
}

impl From<BufferError> for DaemonError {
    fn from(e: BufferError) -> Self {
        DaemonError::Buffer(e)
    }
}

impl From<StoreError> for DaemonError {
    fn from(e: StoreError) -> Self {
        DaemonError::Store(e)
    }
}

impl From<IngestError> for DaemonError {
    fn from(e: IngestError) -> Self {
        DaemonError::Ingest(e)
    }
}

impl From<RecognizerError> for DaemonError {
    fn from(e: RecognizerError) -> Self {
        DaemonError::Recognizer(e)
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(e: std::io::Error) -> Self {
        DaemonError::Io(e)
    }
}

#[cfg(feature = "webrtc-streaming")]
impl From<crate::webrtc::WebRTCError> for DaemonError {
    fn from(e: crate::webrtc::WebRTCError) -> Self {
        DaemonError::WebRTC(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_formats_with_message() {
        let err = DaemonError::Config("missing sessions_dir".into());
        assert_eq!(err.to_string(), "configuration error: missing sessions_dir");
    }
}
