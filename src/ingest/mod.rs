//! RTP ingestion: decode, chunk, and tee one remote track into the timeline.

pub mod driver;
pub mod streamer;
pub mod tee;

pub use driver::{drive, ingestion_format, TeeingSource};
pub use streamer::{IngestError, ReorderBuffer, RtpSource, TrackStreamer};
pub use tee::OpusOggTee;

#[cfg(feature = "webrtc-streaming")]
pub use driver::remote;
