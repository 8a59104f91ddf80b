//! A track's continuous audio buffer plus its ordered event timeline, and
//! the [`Span`] view used to read or annotate a sub-range of it.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use super::buffer::{AudioFormat, ContinuousBuffer, SampleStream};
use super::event::{Event, Handler};
use super::session::Session;
use super::timestamp::{Id, Timestamp};

/// One continuously-recorded audio track within a [`Session`].
///
/// `start` is the offset from the owning session's wall-clock origin at
/// which sample index 0 of `audio` lies. A track is itself a span over
/// `[start, end()]`: every operation `Span` exposes is also exposed
/// directly on `Track`, delegating to the track's full current range.
pub struct Track {
    pub id: Id,
    pub start: Timestamp,
    audio: ContinuousBuffer,
    events: Mutex<Vec<Arc<Event>>>,
    session: Weak<Session>,
}

impl Track {
    pub fn new(start: Timestamp, format: AudioFormat, session: Weak<Session>) -> Arc<Track> {
        Arc::new(Track {
            id: Id::new(),
            start,
            audio: ContinuousBuffer::new(format),
            events: Mutex::new(Vec::new()),
            session,
        })
    }

    /// Reconstructs a track shell from persisted metadata: same id, start,
    /// and format, but an empty audio buffer and no events yet (see
    /// [`Track::restore_event`]). Used only by `store::load`.
    pub fn from_parts(id: Id, start: Timestamp, format: AudioFormat, session: Weak<Session>) -> Arc<Track> {
        Arc::new(Track {
            id,
            start,
            audio: ContinuousBuffer::new(format),
            events: Mutex::new(Vec::new()),
            session,
        })
    }

    /// Appends a previously-persisted event verbatim, without clamping or
    /// dispatching to handlers. Used only by `store::load`.
    pub fn restore_event(&self, event: Event) {
        self.events.lock().push(Arc::new(event));
    }

    pub fn format(&self) -> AudioFormat {
        self.audio.format()
    }

    /// `start + audio.length / sample_rate`, as a track-relative timestamp.
    pub fn end(&self) -> Timestamp {
        self.start + Timestamp::from_samples(self.audio.length() as i64, self.audio.format().sample_rate_hz)
    }

    /// Appends raw interleaved PCM frames to the track's buffer. Returns the
    /// number of frames appended. Does not itself record an `audio` event —
    /// callers (the ingestion driver) do that via `span(...).record_event`.
    pub fn append_audio(&self, frames: impl IntoIterator<Item = Vec<f32>>) -> usize {
        self.audio.append(frames)
    }

    pub fn append_audio_interleaved(&self, scalars: &[f32]) -> usize {
        self.audio.append_interleaved(scalars)
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    /// A view over `[from, to]`. Unlike `record_event`'s own clamping, the
    /// span's bounds are stored as given — annotations may reference
    /// timestamps outside the track's current audio range.
    pub fn span(self: &Arc<Self>, from: Timestamp, to: Timestamp) -> Span {
        Span {
            track: Arc::clone(self),
            from,
            to,
        }
    }

    fn full_span(self: &Arc<Self>) -> Span {
        let end = self.end();
        self.span(self.start, end)
    }

    pub fn audio(self: &Arc<Self>) -> SampleStream {
        self.full_span().audio()
    }

    pub fn events(&self, event_type: &str) -> Vec<Arc<Event>> {
        self.events_intersecting(event_type, self.start, self.end())
    }

    /// All recorded events, in insertion order, regardless of type.
    pub fn all_events(&self) -> Vec<Arc<Event>> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        let events = self.events.lock();
        let mut types: Vec<String> = events.iter().map(|e| e.meta.event_type.clone()).collect();
        types.sort();
        types.dedup();
        types
    }

    pub fn record_event<T>(self: &Arc<Self>, event_type: impl Into<String>, data: T) -> Arc<Event>
    where
        T: Send + Sync + 'static,
    {
        self.full_span().record_event(event_type, data)
    }

    /// Locates an event by ID and replaces it in place. Returns whether a
    /// match was found. Does not re-trigger handler dispatch.
    pub fn update_event(&self, id: &Id, replacement: Event) -> bool {
        let mut events = self.events.lock();
        for slot in events.iter_mut() {
            if &slot.meta.id == id {
                *slot = Arc::new(replacement);
                return true;
            }
        }
        false
    }

    fn events_intersecting(&self, event_type: &str, from: Timestamp, to: Timestamp) -> Vec<Arc<Event>> {
        let events = self.events.lock();
        let mut matched: Vec<Arc<Event>> = events
            .iter()
            .filter(|e| e.meta.event_type == event_type && e.meta.intersects(from, to))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.meta
                .start
                .cmp(&b.meta.start)
                .then(a.meta.end.cmp(&b.meta.end))
        });
        matched
    }

    fn record_event_in_range<T>(
        self: &Arc<Self>,
        event_type: impl Into<String>,
        from: Timestamp,
        to: Timestamp,
        data: T,
    ) -> Arc<Event>
    where
        T: Send + Sync + 'static,
    {
        let lo = self.start;
        let hi = self.end();
        let start = from.clamp(lo, hi);
        let end = to.clamp(lo, hi);
        let event = Arc::new(Event::new(event_type, start, end, data, Arc::downgrade(self)));
        {
            let mut events = self.events.lock();
            events.push(Arc::clone(&event));
        }
        if let Some(session) = self.session.upgrade() {
            session.dispatch(&event);
        }
        event
    }
}

/// A logical, non-owning view over `[from, to]` of a track. Cheap to
/// create; never copies audio.
pub struct Span {
    track: Arc<Track>,
    pub from: Timestamp,
    pub to: Timestamp,
}

impl Span {
    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    pub fn start(&self) -> Timestamp {
        self.from
    }

    pub fn end(&self) -> Timestamp {
        self.to
    }

    /// Samples `[from − track.start, to − track.start)` at the track's
    /// sample rate; out-of-range truncates to the data actually available.
    pub fn audio(&self) -> SampleStream {
        let rate = self.track.format().sample_rate_hz;
        let rel_from = (self.from - self.track.start).to_samples(rate).max(0) as usize;
        let rel_to = (self.to - self.track.start).to_samples(rate).max(0) as usize;
        let count = rel_to.saturating_sub(rel_from);
        self.track.audio.read_truncating(rel_from, count)
    }

    pub fn events(&self, event_type: &str) -> Vec<Arc<Event>> {
        self.track.events_intersecting(event_type, self.from, self.to)
    }

    pub fn event_types(&self) -> Vec<String> {
        self.track.event_types()
    }

    pub fn record_event<T>(&self, event_type: impl Into<String>, data: T) -> Arc<Event>
    where
        T: Send + Sync + 'static,
    {
        self.track.record_event_in_range(event_type, self.from, self.to, data)
    }
}

/// A no-op handler kept for tests that need a `Handler` without side effects.
pub struct NullHandler;

impl Handler for NullHandler {
    fn handle(&self, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::buffer::AudioFormat;
    use crate::timeline::event::{register_event_type, EventMeta};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
    struct Marker;

    fn track_with_audio(samples: i64) -> Arc<Track> {
        register_event_type::<Marker>("track-test.marker");
        let track = Track::new(Timestamp::ZERO, AudioFormat::new(1_000, 1), Weak::new());
        track.append_audio((0..samples).map(|i| vec![i as f32]));
        track
    }

    #[test]
    fn end_tracks_appended_audio_length() {
        let track = track_with_audio(2_000);
        assert_eq!(track.end(), Timestamp::from_nanos(2_000_000_000));
    }

    #[test]
    fn record_event_clamps_out_of_range_span_to_track_bounds() {
        let track = track_with_audio(1_000);
        let ev = track
            .span(Timestamp::from_nanos(-500), Timestamp::from_nanos(5_000_000_000))
            .record_event("track-test.marker", Marker);
        assert_eq!(ev.meta.start, track.start);
        assert_eq!(ev.meta.end, track.end());
    }

    #[test]
    fn events_sorted_by_start_then_end() {
        let track = track_with_audio(1_000);
        track
            .span(Timestamp::from_nanos(500_000_000), Timestamp::from_nanos(600_000_000))
            .record_event("track-test.marker", Marker);
        track
            .span(Timestamp::from_nanos(100_000_000), Timestamp::from_nanos(200_000_000))
            .record_event("track-test.marker", Marker);
        let events = track.events("track-test.marker");
        assert_eq!(events.len(), 2);
        assert!(events[0].meta.start < events[1].meta.start);
    }

    #[test]
    fn update_event_replaces_in_place_and_reports_match() {
        let track = track_with_audio(1_000);
        let ev = track.record_event("track-test.marker", Marker);
        let replacement = Event::from_meta(ev.meta.clone(), Marker, Arc::downgrade(&track));
        assert!(track.update_event(&ev.meta.id, replacement));

        let bogus_meta = EventMeta {
            id: Id::new(),
            event_type: "track-test.marker".into(),
            start: Timestamp::ZERO,
            end: Timestamp::ZERO,
        };
        let bogus = Event::from_meta(bogus_meta.clone(), Marker, Arc::downgrade(&track));
        assert!(!track.update_event(&bogus_meta.id, bogus));
    }
}
