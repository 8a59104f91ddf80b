//! Session/Track/Span/Event timeline model.

pub mod buffer;
pub mod event;
pub mod session;
pub mod timestamp;
pub mod track;

pub use buffer::{AudioFormat, BufferError, ContinuousBuffer, SampleStream};
pub use event::{register_event_type, Event, EventError, EventMeta, Handler};
pub use session::Session;
pub use timestamp::{Id, Timestamp};
pub use track::{Span, Track};
