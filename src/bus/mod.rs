//! Event-type registry and the built-in payload schemas every daemon
//! instance registers before a session can exist.
//!
//! The registry itself lives in [`crate::timeline::event`]; synchronous
//! fan-out to handlers lives on [`crate::timeline::Session`]. This module is
//! the place that knows the concrete built-in schemas (`audio`, `activity`,
//! `transcription`) and wires them into the registry at startup.

use serde::{Deserialize, Serialize};

use crate::timeline::event::register_event_type;

pub const AUDIO: &str = "audio";
pub const ACTIVITY: &str = "activity";
pub const TRANSCRIPTION: &str = "transcription";

/// Payload for `audio` events: a marker that a chunk of PCM was appended.
/// The samples themselves live in the track's `ContinuousBuffer`, not in
/// the event; `audio` events are transient and elided at persistence time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AudioAppended;

/// Payload for `activity` events: a VAD-flagged speech span. No data beyond
/// the span's own `start`/`end`, matching the original implementation's
/// `Annotate("activity", nil)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Activity;

/// One recognized word within a `transcription` event's payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Word {
    pub word: String,
    pub start: crate::timeline::Timestamp,
    pub end: crate::timeline::Timestamp,
    pub prob: f32,
}

/// Payload for `transcription` events: the recognizer's word list for the
/// span it was given.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Transcription {
    pub words: Vec<Word>,
}

/// Registers the built-in event types. Must run once at process startup,
/// before any session is created — registration is not dynamic.
pub fn register_builtin_types() {
    register_event_type::<AudioAppended>(AUDIO);
    register_event_type::<Activity>(ACTIVITY);
    register_event_type::<Transcription>(TRANSCRIPTION);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::event::is_registered;

    #[test]
    fn builtin_types_are_registered() {
        register_builtin_types();
        assert!(is_registered(AUDIO));
        assert!(is_registered(ACTIVITY));
        assert!(is_registered(TRANSCRIPTION));
    }
}
