//! A session: tracks sharing a wall-clock origin, plus the ordered handler
//! list that `Track::record_event` dispatches through.

use log::error;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use super::buffer::AudioFormat;
use super::event::{Event, Handler};
use super::timestamp::{Id, Timestamp};
use super::track::Track;

/// A collection of tracks under a shared wall-clock origin. Tracks are
/// created only by the session and never deleted.
pub struct Session {
    pub id: Id,
    pub start: SystemTime,
    tracks: Mutex<Vec<Arc<Track>>>,
    handlers: Mutex<Vec<Arc<dyn Handler>>>,
}

impl Session {
    pub fn new() -> Arc<Session> {
        Self::with_id_and_start(Id::new(), SystemTime::now())
    }

    pub fn with_id_and_start(id: Id, start: SystemTime) -> Arc<Session> {
        Arc::new(Session {
            id,
            start,
            tracks: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Creates a track whose `start` is `now - session.start`.
    pub fn new_track(self: &Arc<Self>, format: AudioFormat) -> Arc<Track> {
        let elapsed = self
            .start
            .elapsed()
            .unwrap_or_default();
        self.new_track_at(Timestamp::from_nanos(elapsed.as_nanos() as i64), format)
    }

    /// Creates a track whose `start` is the given session-relative offset.
    pub fn new_track_at(self: &Arc<Self>, start: Timestamp, format: AudioFormat) -> Arc<Track> {
        let track = Track::new(start, format, Arc::downgrade(self));
        self.tracks.lock().push(Arc::clone(&track));
        track
    }

    pub fn tracks(&self) -> Vec<Arc<Track>> {
        self.tracks.lock().clone()
    }

    /// Appends an already-constructed track (with its events already
    /// restored). Used only by `store::load`.
    pub fn restore_track(&self, track: Arc<Track>) {
        self.tracks.lock().push(track);
    }

    pub fn track(&self, id: &Id) -> Option<Arc<Track>> {
        self.tracks.lock().iter().find(|t| &t.id == id).cloned()
    }

    /// Registers a handler to be invoked, in registration order, on every
    /// `record_event` call across any of this session's tracks.
    pub fn listen(&self, handler: Arc<dyn Handler>) {
        self.handlers.lock().push(handler);
    }

    /// Removes a previously-registered handler by identity.
    pub fn unlisten(&self, handler: &Arc<dyn Handler>) {
        self.handlers
            .lock()
            .retain(|h| !Arc::ptr_eq(h, handler));
    }

    /// Invokes every registered handler synchronously, in registration
    /// order. A handler that panics is logged and skipped; delivery to the
    /// remaining handlers continues, and the event stays recorded.
    pub fn dispatch(&self, event: &Event) {
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            if let Err(panic) = result {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    "handler fault delivering {:?} event {}: {}",
                    event.meta.event_type, event.meta.id, msg
                );
            }
        }
    }
}

/// Convenience for components that only hold a weak reference to their
/// owning session (tracks, spans, events).
pub fn upgrade_or_log(session: &Weak<Session>, context: &str) -> Option<Arc<Session>> {
    let upgraded = session.upgrade();
    if upgraded.is_none() {
        error!("{}: owning session has been dropped", context);
    }
    upgraded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::event::register_event_type;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping;

    struct CountingHandler(Arc<AtomicUsize>);
    impl Handler for CountingHandler {
        fn handle(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingHandler;
    impl Handler for PanickingHandler {
        fn handle(&self, _event: &Event) {
            panic!("boom");
        }
    }

    #[test]
    fn new_track_at_sets_exact_offset() {
        register_event_type::<Ping>("session-test.ping");
        let session = Session::new();
        let track = session.new_track_at(Timestamp::from_nanos(42), AudioFormat::MONO_16K);
        assert_eq!(track.start, Timestamp::from_nanos(42));
        assert_eq!(session.tracks().len(), 1);
    }

    #[test]
    fn handlers_fire_in_registration_order_and_survive_a_panic() {
        register_event_type::<Ping>("session-test.ping2");
        let session = Session::new();
        let calls = Arc::new(AtomicUsize::new(0));
        session.listen(Arc::new(PanickingHandler));
        session.listen(Arc::new(CountingHandler(calls.clone())));

        let track = session.new_track_at(Timestamp::ZERO, AudioFormat::MONO_16K);
        track.append_audio_interleaved(&[0.0; 10]);
        track.record_event("session-test.ping2", Ping);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unlisten_removes_handler_by_identity() {
        register_event_type::<Ping>("session-test.ping3");
        let session = Session::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn Handler> = Arc::new(CountingHandler(calls.clone()));
        session.listen(handler.clone());
        session.unlisten(&handler);

        let track = session.new_track_at(Timestamp::ZERO, AudioFormat::MONO_16K);
        track.record_event("session-test.ping3", Ping);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
