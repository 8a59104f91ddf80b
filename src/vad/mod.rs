//! Per-track sliding-window voice-activity detector.
//!
//! Subscribes to `audio` events; on each chunk, folds the chunk's samples
//! into a per-track window and emits `activity` events across the spans
//! where speech was detected.

use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::bus::{Activity, ACTIVITY, AUDIO};
use crate::timeline::{Event, Handler, Id, Timestamp};

#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    pub sample_rate_hz: u32,
    /// Upper bound on how much PCM a window accumulates before a final
    /// flush is forced, regardless of whether silence was ever seen.
    pub max_window_duration: std::time::Duration,
    /// How far back from the end of the window the detector looks when
    /// deciding whether the track has gone silent.
    pub vad_gap_duration: std::time::Duration,
    /// While speaking, a draft flush is emitted after this much pending
    /// audio has accumulated, so downstream consumers see partial results
    /// without waiting for silence.
    pub max_pending: std::time::Duration,
    pub energy_threshold: f32,
    pub silence_threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        VadConfig {
            sample_rate_hz: 16_000,
            max_window_duration: std::time::Duration::from_secs(24),
            vad_gap_duration: std::time::Duration::from_millis(700),
            max_pending: std::time::Duration::from_millis(500),
            energy_threshold: 0.0005,
            silence_threshold: 0.015,
        }
    }
}

impl VadConfig {
    fn max_window_samples(&self) -> usize {
        (self.max_window_duration.as_secs_f64() * self.sample_rate_hz as f64) as usize
    }

    fn vad_gap_samples(&self) -> usize {
        (self.vad_gap_duration.as_secs_f64() * self.sample_rate_hz as f64) as usize
    }

    fn max_pending_ms(&self) -> u64 {
        self.max_pending.as_millis() as u64
    }
}

/// Energy + mean-absolute-amplitude gate over a frame of samples.
/// Returns `(is_speaking, energy, silence)`.
fn vad(frame: &[f32], energy_threshold: f32, silence_threshold: f32) -> (bool, f32, f32) {
    if frame.is_empty() {
        return (false, 0.0, 0.0);
    }
    let energy = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    let silence = frame.iter().map(|s| s.abs()).sum::<f32>() / frame.len() as f32;
    if energy < energy_threshold || silence < silence_threshold {
        (false, energy, silence)
    } else {
        (true, energy, silence)
    }
}

/// Accumulated state for one track's speech window.
#[derive(Default)]
struct Window {
    pcm: Vec<f32>,
    chunk_id: Option<Id>,
    is_speaking: bool,
    pending_ms: u64,
}

impl Window {
    /// Folds `pcm` (ending at track-relative `end`) into the window.
    /// Returns `Some((start, is_final))` when a span of speech should be
    /// annotated; `start` is always computed from the window's length
    /// *before* any clearing happens, so a final flush is never a
    /// degenerate zero-width span.
    fn push(&mut self, cfg: &VadConfig, pcm: &[f32], end: Timestamp) -> Option<(Timestamp, bool)> {
        if self.chunk_id.is_none() {
            self.chunk_id = Some(Id::new());
        }

        let max_window = cfg.max_window_samples();
        if self.pcm.len() + pcm.len() > max_window {
            warn!(
                "vad window overflow by {} samples (have {}, pushing {}, cap {})",
                self.pcm.len() + pcm.len() - max_window,
                self.pcm.len(),
                pcm.len(),
                max_window
            );
        }
        self.pcm.extend_from_slice(pcm);
        self.pending_ms += (pcm.len() as u64 * 1000) / cfg.sample_rate_hz as u64;

        let mut flush_final = self.pcm.len() >= max_window;

        let gap = cfg.vad_gap_samples();
        let vad_start = self.pcm.len().saturating_sub(gap);
        let was_speaking = self.is_speaking;
        let (is_speaking_now, _energy, _silence) =
            vad(&self.pcm[vad_start..], cfg.energy_threshold, cfg.silence_threshold);
        if is_speaking_now {
            self.is_speaking = true;
        }
        if !self.pcm.is_empty() && !is_speaking_now && was_speaking {
            flush_final = true;
        }

        if flush_final {
            let start = end - Timestamp::from_samples(self.pcm.len() as i64, cfg.sample_rate_hz);
            self.chunk_id = None;
            self.is_speaking = false;
            self.pcm.clear();
            self.pending_ms = 0;
            return Some((start, true));
        }

        if self.pending_ms >= cfg.max_pending_ms() && is_speaking_now {
            let start = end - Timestamp::from_samples(self.pcm.len() as i64, cfg.sample_rate_hz);
            self.pending_ms = 0;
            return Some((start, false));
        }

        None
    }
}

/// The VAD handler: one [`Window`] per track, keyed by track id.
pub struct Vad {
    config: VadConfig,
    windows: Mutex<HashMap<Id, Window>>,
}

impl Vad {
    pub fn new(config: VadConfig) -> Self {
        Vad {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl Handler for Vad {
    fn handle(&self, event: &Event) {
        if event.meta.event_type != AUDIO {
            return;
        }
        let Some(track) = event.track() else {
            return;
        };
        let span = track.span(event.meta.start, event.meta.end);
        let pcm: Vec<f32> = span.audio().flatten().collect();
        if pcm.is_empty() {
            return;
        }

        let flushed = {
            let mut windows = self.windows.lock();
            let window = windows.entry(track.id.clone()).or_default();
            window.push(&self.config, &pcm, event.meta.end)
        };

        if let Some((start, is_final)) = flushed {
            info!(
                "vad: {} speech span on track {} [{}, {})",
                if is_final { "final" } else { "draft" },
                track.id,
                start,
                event.meta.end
            );
            track
                .span(start, event.meta.end)
                .record_event(ACTIVITY, Activity);
        }
    }
}
