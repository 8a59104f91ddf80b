//! sessioncore - timeline core for a meeting-recorder daemon
//!
//! Ingests live WebRTC audio into a persistent, timestamped multi-track
//! session model, detects speech activity, and dispatches speech segments
//! to external recognition back-ends, recording the results as events
//! layered onto the same timeline.

pub mod args;
pub mod bus;
pub mod config;
pub mod debounce;
pub mod error;
pub mod ingest;
pub mod recognizer;
pub mod store;
pub mod timeline;
pub mod transport;
pub mod vad;
pub mod web;
pub mod webrtc;

pub use config::Config;
pub use error::DaemonError;
pub use timeline::{Event, Id, Session, Span, Timestamp, Track};
