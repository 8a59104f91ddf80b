//! End-to-end scenarios spanning the timeline model, the VAD handler, and
//! session persistence — the cross-module behavior a single `#[cfg(test)]`
//! block can't exercise because it needs a fully-wired `Session`.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sessioncore::bus::{self, ACTIVITY, AUDIO};
use sessioncore::timeline::{register_event_type, AudioFormat, Event, Handler, Id, Session, Timestamp, Track};
use sessioncore::vad::{Vad, VadConfig};
use serde::{Deserialize, Serialize};

const RATE: u32 = 16_000;
const CHUNK_FRAMES: usize = RATE as usize / 10; // 100ms, matching ingest::driver

fn silence(n: usize) -> Vec<f32> {
    vec![0.0; n]
}

fn tone(n: usize, freq: f32, amp: f32, phase0: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = (phase0 + i) as f32 / RATE as f32;
            amp * (2.0 * PI * freq * t).sin()
        })
        .collect()
}

/// Feeds `pcm` to `track` in fixed 100ms chunks, recording one `audio`
/// event per chunk exactly as `ingest::driver::drive` does, so handlers
/// registered on the owning session observe it the same way production
/// ingestion would.
fn feed(track: &Arc<Track>, pcm: &[f32]) {
    for chunk in pcm.chunks(CHUNK_FRAMES) {
        let prev_end = track.end();
        track.append_audio_interleaved(chunk);
        let new_end = track.end();
        track.span(prev_end, new_end).record_event(AUDIO, bus::AudioAppended);
    }
}

fn vad_session() -> (Arc<Session>, Arc<Track>) {
    bus::register_builtin_types();
    let session = Session::new();
    session.listen(Arc::new(Vad::new(VadConfig::default())));
    let track = session.new_track_at(Timestamp::ZERO, AudioFormat::new(RATE, 1));
    (session, track)
}

/// Scenario 1: a single utterance — 200ms silence, 1.5s tone, 1s silence —
/// should surface at least one `activity` span covering roughly the tone.
#[test]
fn single_utterance_produces_an_activity_span_covering_the_tone() {
    let (_session, track) = vad_session();

    let mut pcm = silence(RATE as usize * 200 / 1000);
    pcm.extend(tone(RATE as usize * 3 / 2, 300.0, 0.5, pcm.len()));
    pcm.extend(silence(RATE as usize));
    feed(&track, &pcm);

    let activity = track.events(ACTIVITY);
    assert!(!activity.is_empty(), "expected at least one activity event");

    let covers_tone = activity.iter().any(|e| {
        let start_ms = e.meta.start.nanos() / 1_000_000;
        let end_ms = e.meta.end.nanos() / 1_000_000;
        start_ms <= 400 && end_ms >= 1_600 && end_ms <= 3_200
    });
    assert!(covers_tone, "no activity span covered the spoken interval: {:?}", activity.iter().map(|e| (e.meta.start, e.meta.end)).collect::<Vec<_>>());
}

/// Scenario 2: two 1s tones separated by 1s of silence should surface two
/// activity spans that do not overlap each other's tone.
#[test]
fn two_utterances_produce_two_distinct_activity_spans() {
    let (_session, track) = vad_session();

    let mut pcm = tone(RATE as usize, 300.0, 0.5, 0);
    pcm.extend(silence(RATE as usize));
    let second_start = pcm.len();
    pcm.extend(tone(RATE as usize, 300.0, 0.5, second_start));
    pcm.extend(silence(RATE as usize));
    feed(&track, &pcm);

    let activity = track.events(ACTIVITY);
    assert!(activity.len() >= 2, "expected at least two activity events, got {}", activity.len());

    let first_tone_ms = (0, 1_000);
    let second_tone_start_ms = (second_start as i64 * 1000) / RATE as i64;
    let covers_first = activity
        .iter()
        .any(|e| e.meta.start.nanos() / 1_000_000 <= first_tone_ms.1 && e.meta.end.nanos() / 1_000_000 >= first_tone_ms.0);
    let covers_second = activity
        .iter()
        .any(|e| e.meta.end.nanos() / 1_000_000 >= second_tone_start_ms + 500);
    assert!(covers_first, "no activity span covered the first utterance");
    assert!(covers_second, "no activity span covered the second utterance");
}

/// Scenario 3: a monologue that exceeds `max_window_duration` forces a
/// final flush at the cap, and a trailing silence flushes the remainder.
#[test]
fn long_monologue_flushes_at_the_window_cap_and_again_on_trailing_silence() {
    let (_session, track) = vad_session();

    let mut pcm = tone(RATE as usize * 30, 300.0, 0.5, 0);
    pcm.extend(silence(RATE as usize));
    feed(&track, &pcm);

    let activity = track.events(ACTIVITY);
    assert!(activity.len() >= 2, "expected a cap flush plus a remainder flush, got {}", activity.len());

    let cap_flush = activity.iter().any(|e| {
        let end_ms = e.meta.end.nanos() / 1_000_000;
        (23_900..=24_200).contains(&end_ms)
    });
    assert!(cap_flush, "no activity span ended at the ~24s window cap");
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TextNote(String);

/// Scenario 4: a session round-trips through save/load, event lists equal
/// modulo the back-reference to the owning track.
#[test]
fn session_round_trips_events_through_save_and_load() {
    register_event_type::<TextNote>("scenario.text");
    let dir = std::env::temp_dir().join(format!("sessioncore-scenario-roundtrip-{}", Id::new()));

    let session = Session::new();
    let track = session.new_track_at(Timestamp::ZERO, AudioFormat::new(RATE, 1));
    track.append_audio_interleaved(&silence(160));
    track
        .span(Timestamp::ZERO, Timestamp::from_nanos(10_000_000))
        .record_event("scenario.text", TextNote("hello".into()));

    sessioncore::store::save(&session, &dir).unwrap();
    let loaded = sessioncore::store::load(&dir, &session.id).unwrap();

    assert_eq!(loaded.id, session.id);
    let loaded_track = &loaded.tracks()[0];
    let original_events = track.events("scenario.text");
    let loaded_events = loaded_track.events("scenario.text");
    assert_eq!(original_events.len(), loaded_events.len());
    assert_eq!(
        original_events[0].downcast::<TextNote>().unwrap(),
        loaded_events[0].downcast::<TextNote>().unwrap()
    );
    assert_eq!(original_events[0].meta.start, loaded_events[0].meta.start);
    assert_eq!(original_events[0].meta.end, loaded_events[0].meta.end);

    std::fs::remove_dir_all(&dir).ok();
}

/// Scenario 5: two tracks fed interleaved appends each keep their own
/// `audio` events sorted by start; cross-track ordering is unconstrained.
#[test]
fn multi_track_audio_events_are_sorted_within_each_track() {
    bus::register_builtin_types();
    let session = Session::new();
    let a = session.new_track_at(Timestamp::ZERO, AudioFormat::new(RATE, 1));
    let b = session.new_track_at(Timestamp::ZERO, AudioFormat::new(RATE, 1));

    for _ in 0..5 {
        feed(&a, &silence(CHUNK_FRAMES));
        feed(&b, &silence(CHUNK_FRAMES));
    }

    for track in [&a, &b] {
        let events = track.events(AUDIO);
        let mut prev = Timestamp::from_nanos(i64::MIN);
        for e in &events {
            assert!(e.meta.start >= prev, "audio events must be sorted by start");
            prev = e.meta.start;
        }
        assert_eq!(events.len(), 5);
    }
}

struct FaultingHandler;
impl Handler for FaultingHandler {
    fn handle(&self, _event: &Event) {
        panic!("handler always faults");
    }
}

struct CountingHandler(Arc<AtomicUsize>);
impl Handler for CountingHandler {
    fn handle(&self, _event: &Event) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scenario 6: a faulting handler must not prevent delivery to handlers
/// registered after it.
#[test]
fn a_faulting_handler_does_not_block_later_handlers() {
    register_event_type::<TextNote>("scenario.fault-isolation");
    let session = Session::new();
    session.listen(Arc::new(FaultingHandler));
    let seen = Arc::new(AtomicUsize::new(0));
    session.listen(Arc::new(CountingHandler(seen.clone())));

    let track = session.new_track_at(Timestamp::ZERO, AudioFormat::new(RATE, 1));
    track.append_audio_interleaved(&silence(160));
    track
        .span(Timestamp::ZERO, Timestamp::from_nanos(1))
        .record_event("scenario.fault-isolation", TextNote("ping".into()));

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(track.events("scenario.fault-isolation").len(), 1);
}
