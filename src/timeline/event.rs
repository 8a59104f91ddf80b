//! Typed events recorded on a track's timeline, and the process-wide
//! registry mapping event-type names to their payload schema.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock, Weak};

use super::timestamp::{Id, Timestamp};
use super::track::Track;

#[derive(Debug)]
pub enum EventError {
    /// No `register_event_type` call has registered this name.
    UnregisteredType(String),
    Decode(String, String),
    Encode(String, String),
    /// `downcast` was asked for a Rust type that doesn't match the event's
    /// registered payload type.
    PayloadMismatch,
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::UnregisteredType(t) => write!(f, "unregistered event type {:?}", t),
            EventError::Decode(t, e) => write!(f, "decoding event type {:?}: {}", t, e),
            EventError::Encode(t, e) => write!(f, "encoding event type {:?}: {}", t, e),
            EventError::PayloadMismatch => write!(f, "payload does not match requested type"),
        }
    }
}

impl std::error::Error for EventError {}

type Payload = Box<dyn Any + Send + Sync>;
type Decoder = Box<dyn Fn(&[u8]) -> Result<Payload, EventError> + Send + Sync>;
type Encoder = Box<dyn Fn(&Payload) -> Result<Vec<u8>, EventError> + Send + Sync>;

struct TypeEntry {
    decode: Decoder,
    encode: Encoder,
}

static REGISTRY: OnceLock<RwLock<HashMap<String, TypeEntry>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, TypeEntry>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers `T` as the payload schema for event type `name`. Intended to be
/// called once at process startup, before any session exists; the registry
/// is process-wide and write-many only in the sense that re-registering a
/// name simply replaces its entry (there is no explicit unregister).
pub fn register_event_type<T>(name: &str)
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let decode_name = name.to_string();
    let encode_name = name.to_string();
    let entry = TypeEntry {
        decode: Box::new(move |bytes| {
            serde_cbor::from_slice::<T>(bytes)
                .map(|v| Box::new(v) as Payload)
                .map_err(|e| EventError::Decode(decode_name.clone(), e.to_string()))
        }),
        encode: Box::new(move |payload| {
            let value = payload
                .downcast_ref::<T>()
                .ok_or(EventError::PayloadMismatch)?;
            serde_cbor::to_vec(value).map_err(|e| EventError::Encode(encode_name.clone(), e.to_string()))
        }),
    };
    registry().write().unwrap().insert(name.to_string(), entry);
}

pub fn is_registered(name: &str) -> bool {
    registry().read().unwrap().contains_key(name)
}

fn decode_payload(event_type: &str, bytes: &[u8]) -> Result<Payload, EventError> {
    let reg = registry().read().unwrap();
    let entry = reg
        .get(event_type)
        .ok_or_else(|| EventError::UnregisteredType(event_type.to_string()))?;
    (entry.decode)(bytes)
}

fn encode_payload(event_type: &str, payload: &Payload) -> Result<Vec<u8>, EventError> {
    let reg = registry().read().unwrap();
    let entry = reg
        .get(event_type)
        .ok_or_else(|| EventError::UnregisteredType(event_type.to_string()))?;
    (entry.encode)(payload)
}

/// Identity and placement of an [`Event`] on its track's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub id: Id,
    pub event_type: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl EventMeta {
    /// Whether `[start, end]` intersects `[from, to]`: `end >= from AND
    /// start <= to`.
    pub fn intersects(&self, from: Timestamp, to: Timestamp) -> bool {
        self.end >= from && self.start <= to
    }
}

/// A typed record attached to a track's timeline.
///
/// The payload is stored as `Box<dyn Any>` and recovered via [`Event::downcast`];
/// encoding/decoding to bytes goes through the event-type registry keyed by
/// `meta.event_type`, never through `Any`'s type id directly, so payloads
/// survive a process restart.
pub struct Event {
    pub meta: EventMeta,
    payload: Payload,
    track: Weak<Track>,
}

impl Event {
    pub fn new<T>(event_type: impl Into<String>, start: Timestamp, end: Timestamp, payload: T, track: Weak<Track>) -> Self
    where
        T: Send + Sync + 'static,
    {
        Event {
            meta: EventMeta {
                id: Id::new(),
                event_type: event_type.into(),
                start,
                end,
            },
            payload: Box::new(payload),
            track,
        }
    }

    /// Builds an event from an already-assembled `EventMeta`, e.g. when
    /// constructing a replacement for `Track::update_event` that must keep
    /// the original id.
    pub fn from_meta<T>(meta: EventMeta, payload: T, track: Weak<Track>) -> Self
    where
        T: Send + Sync + 'static,
    {
        Event {
            meta,
            payload: Box::new(payload),
            track,
        }
    }

    /// Reconstructs an event from its persisted form via the type registry.
    pub fn from_encoded(meta: EventMeta, bytes: &[u8], track: Weak<Track>) -> Result<Self, EventError> {
        let payload = decode_payload(&meta.event_type, bytes)?;
        Ok(Event { meta, payload, track })
    }

    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        encode_payload(&self.meta.event_type, &self.payload)
    }

    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn track(&self) -> Option<std::sync::Arc<Track>> {
        self.track.upgrade()
    }

    pub fn replace_payload<T>(&mut self, payload: T)
    where
        T: Send + Sync + 'static,
    {
        self.payload = Box::new(payload);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("meta", &self.meta)
            .finish()
    }
}

/// Something that reacts to events recorded on a session's tracks.
///
/// A handler's fault (panic or returned error) during dispatch must not
/// prevent delivery to the remaining handlers, nor abort the recording
/// call that triggered dispatch; see `bus` for the isolation boundary.
pub trait Handler: Send + Sync {
    fn handle(&self, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Marker {
        n: u32,
    }

    #[test]
    fn registered_type_round_trips_through_bytes() {
        register_event_type::<Marker>("test.marker");
        let ev = Event::new("test.marker", Timestamp::ZERO, Timestamp::ZERO, Marker { n: 7 }, Weak::new());
        let bytes = ev.encode().unwrap();
        let restored = Event::from_encoded(ev.meta.clone(), &bytes, Weak::new()).unwrap();
        assert_eq!(restored.downcast::<Marker>().unwrap(), &Marker { n: 7 });
    }

    #[test]
    fn unregistered_type_fails_to_decode() {
        let meta = EventMeta {
            id: Id::new(),
            event_type: "test.nonexistent-marker-xyz".into(),
            start: Timestamp::ZERO,
            end: Timestamp::ZERO,
        };
        let err = Event::from_encoded(meta, &[], Weak::new()).unwrap_err();
        assert!(matches!(err, EventError::UnregisteredType(_)));
    }

    #[test]
    fn point_event_intersects_containing_span_only() {
        let meta = EventMeta {
            id: Id::new(),
            event_type: "x".into(),
            start: Timestamp::from_nanos(100),
            end: Timestamp::from_nanos(100),
        };
        assert!(meta.intersects(Timestamp::from_nanos(0), Timestamp::from_nanos(200)));
        assert!(meta.intersects(Timestamp::from_nanos(0), Timestamp::from_nanos(100)));
        assert!(!meta.intersects(Timestamp::from_nanos(0), Timestamp::from_nanos(99)));
    }
}
