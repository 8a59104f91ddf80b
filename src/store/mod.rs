//! CBOR persistence for sessions.
//!
//! Layout on disk, one directory per session:
//! ```text
//! sessions/<session-id>/
//!     session                 <- CBOR blob (SessionDto)
//!     track-<track-id>.ogg    <- written by ingest::tee, not touched here
//! ```
//!
//! The persisted form omits audio samples (they live in the `.ogg`
//! siblings) and elides `audio`-typed events, which are transient.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::bus::AUDIO;
use crate::timeline::buffer::AudioFormat;
use crate::timeline::event::{EventError, EventMeta};
use crate::timeline::{Event, Id, Session, Timestamp, Track};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Encode(serde_cbor::Error),
    Decode(serde_cbor::Error),
    /// A persisted event's type has no registry entry; the whole session
    /// load fails rather than silently dropping data.
    UnknownEventType(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "i/o error: {}", e),
            StoreError::Encode(e) => write!(f, "cbor encode error: {}", e),
            StoreError::Decode(e) => write!(f, "cbor decode error: {}", e),
            StoreError::UnknownEventType(t) => write!(f, "unknown event type {:?} in persisted session", t),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<EventError> for StoreError {
    fn from(e: EventError) -> Self {
        match e {
            EventError::UnregisteredType(t) => StoreError::UnknownEventType(t),
            EventError::Decode(t, _) => StoreError::UnknownEventType(t),
            other => StoreError::UnknownEventType(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventDto {
    pub id: Id,
    pub event_type: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub payload: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackDto {
    pub id: Id,
    pub start: Timestamp,
    pub format: AudioFormat,
    pub events: Vec<EventDto>,
}

/// The on-disk (and over-the-wire, for the live data channel) shape of a
/// session snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDto {
    pub id: Id,
    pub start_unix_nanos: i64,
    pub tracks: Vec<TrackDto>,
}

pub fn session_dir(sessions_root: &Path, id: &Id) -> PathBuf {
    sessions_root.join(id.as_str())
}

fn session_file(sessions_root: &Path, id: &Id) -> PathBuf {
    session_dir(sessions_root, id).join("session")
}

/// Creates `sessions_root/<id>` (and any missing ancestors) if it doesn't
/// already exist, with mode `0744` per spec.md §6. Shared by `save` and by
/// `ingest`'s Ogg tee, which writes `track-<id>.ogg` as a sibling of the
/// `session` blob in the same directory.
pub fn ensure_session_dir(sessions_root: &Path, id: &Id) -> std::io::Result<PathBuf> {
    let dir = session_dir(sessions_root, id);
    create_dir_0744(&dir)?;
    Ok(dir)
}

#[cfg(unix)]
fn create_dir_0744(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o744).create(dir)
}

#[cfg(not(unix))]
fn create_dir_0744(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

/// Snapshots `session` to `sessions_root/<id>/session`, replacing any
/// existing snapshot atomically (write to a temp file, then rename).
pub fn save(session: &Session, sessions_root: &Path) -> Result<(), StoreError> {
    let dto = to_dto(session)?;
    let dir = ensure_session_dir(sessions_root, &session.id)?;

    let bytes = serde_cbor::to_vec(&dto).map_err(StoreError::Encode)?;
    let final_path = session_file(sessions_root, &session.id);
    let temp_path = dir.join("session.tmp");
    fs::write(&temp_path, &bytes)?;
    fs::rename(&temp_path, &final_path)?;
    Ok(())
}

/// Builds the wire/disk representation of `session` at this instant.
/// Exposed so the data-channel handler can push the same shape the store
/// persists, without going through disk.
pub fn to_dto(session: &Session) -> Result<SessionDto, StoreError> {
    let start_unix_nanos = session
        .start
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64;

    let mut tracks = Vec::new();
    for track in session.tracks() {
        let mut events = Vec::new();
        for event in track.all_events() {
            if event.meta.event_type == AUDIO {
                continue;
            }
            events.push(EventDto {
                id: event.meta.id.clone(),
                event_type: event.meta.event_type.clone(),
                start: event.meta.start,
                end: event.meta.end,
                payload: event.encode()?,
            });
        }
        tracks.push(TrackDto {
            id: track.id.clone(),
            start: track.start,
            format: track.format(),
            events,
        });
    }

    Ok(SessionDto {
        id: session.id.clone(),
        start_unix_nanos,
        tracks,
    })
}

/// Loads a session previously written by [`save`]. Audio buffers come back
/// empty — only the event timeline and track metadata are restored; the
/// ingestion driver repopulates audio by re-opening the track's live RTP
/// source, which this on-disk form was never meant to replace.
pub fn load(sessions_root: &Path, id: &Id) -> Result<Arc<Session>, StoreError> {
    let bytes = fs::read(session_file(sessions_root, id))?;
    let dto: SessionDto = serde_cbor::from_slice(&bytes).map_err(StoreError::Decode)?;
    from_dto(dto)
}

/// Lists the session ids with a persisted snapshot under `sessions_root`.
pub fn saved_sessions(sessions_root: &Path) -> Result<Vec<Id>, StoreError> {
    let mut ids = Vec::new();
    if !sessions_root.exists() {
        return Ok(ids);
    }
    for entry in fs::read_dir(sessions_root)? {
        let entry = entry?;
        if entry.path().join("session").is_file() {
            if let Some(name) = entry.file_name().to_str() {
                ids.push(Id::from(name.to_string()));
            }
        }
    }
    Ok(ids)
}

fn from_dto(dto: SessionDto) -> Result<Arc<Session>, StoreError> {
    let start = UNIX_EPOCH + Duration::from_nanos(dto.start_unix_nanos.max(0) as u64);
    let session = Session::with_id_and_start(dto.id, start);

    for track_dto in dto.tracks {
        let track = Track::from_parts(track_dto.id, track_dto.start, track_dto.format, Arc::downgrade(&session));
        for event_dto in track_dto.events {
            let meta = EventMeta {
                id: event_dto.id,
                event_type: event_dto.event_type,
                start: event_dto.start,
                end: event_dto.end,
            };
            let event = Event::from_encoded(meta, &event_dto.payload, Arc::downgrade(&track))?;
            track.restore_event(event);
        }
        session.restore_track(track);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::event::register_event_type;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Note(String);

    #[test]
    fn round_trips_events_and_excludes_audio() {
        register_event_type::<Note>("store-test.note");

        let dir = std::env::temp_dir().join(format!("sessioncore-store-test-{}", Id::new()));
        let session = Session::new();
        let track = session.new_track_at(Timestamp::ZERO, AudioFormat::MONO_16K);
        track.append_audio_interleaved(&[0.0; 100]);
        track
            .span(Timestamp::ZERO, Timestamp::from_nanos(1))
            .record_event(AUDIO, ());
        track
            .span(Timestamp::ZERO, Timestamp::from_nanos(2))
            .record_event("store-test.note", Note("hello".into()));

        save(&session, &dir).unwrap();
        let restored = load(&dir, &session.id).unwrap();

        assert_eq!(restored.tracks().len(), 1);
        let restored_track = &restored.tracks()[0];
        let notes = restored_track.events("store-test.note");
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].downcast::<Note>().unwrap(), &Note("hello".into()));
        assert!(restored_track.events(AUDIO).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_event_type_fails_the_whole_load() {
        let dir = std::env::temp_dir().join(format!("sessioncore-store-test-unknown-{}", Id::new()));
        let session = Session::new();
        let track = session.new_track_at(Timestamp::ZERO, AudioFormat::MONO_16K);
        track.append_audio_interleaved(&[0.0; 10]);
        save(&session, &dir).unwrap();

        // Hand-corrupt the snapshot with a reference to an unregistered type.
        let bytes = fs::read(session_file(&dir, &session.id)).unwrap();
        let mut dto: SessionDto = serde_cbor::from_slice(&bytes).unwrap();
        dto.tracks[0].events.push(EventDto {
            id: Id::new(),
            event_type: "store-test.totally-unregistered".into(),
            start: Timestamp::ZERO,
            end: Timestamp::ZERO,
            payload: Vec::new(),
        });
        let bytes = serde_cbor::to_vec(&dto).unwrap();
        fs::write(session_file(&dir, &session.id), bytes).unwrap();

        let err = load(&dir, &session.id).unwrap_err();
        assert!(matches!(err, StoreError::UnknownEventType(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
