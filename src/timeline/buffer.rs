//! Append-only PCM storage with sample-accurate random read.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample rate, channel count, and per-sample precision of a
/// [`ContinuousBuffer`]. Bound once at construction and immutable after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate_hz: u32,
    pub channels: u16,
    /// Sample precision in bytes (4 for f32 PCM).
    pub sample_bytes: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate_hz: u32, channels: u16) -> Self {
        AudioFormat {
            sample_rate_hz,
            channels,
            sample_bytes: 4,
        }
    }

    pub const MONO_16K: AudioFormat = AudioFormat::new(16_000, 1);
}

#[derive(Debug)]
pub enum BufferError {
    /// `offset + count` exceeded the buffer's length at read-start time.
    OutOfRange { requested: usize, available: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::OutOfRange {
                requested,
                available,
            } => write!(
                f,
                "read of {} frames exceeds available {} frames",
                requested, available
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// A lazily-materialized run of interleaved PCM frames.
///
/// Backed by an already-collected `Vec` in this implementation (there is no
/// natural place for true async laziness without committing the whole crate
/// to a streaming-iterator abstraction), but callers should treat it as a
/// one-shot, forward-only sequence of frames, each `format.channels` samples
/// wide.
#[derive(Debug, Clone, Default)]
pub struct SampleStream {
    frames: Vec<f32>,
    channels: u16,
    pos: usize,
}

impl SampleStream {
    fn new(frames: Vec<f32>, channels: u16) -> Self {
        SampleStream {
            frames,
            channels,
            pos: 0,
        }
    }

    /// Total number of frames remaining in the stream.
    pub fn len(&self) -> usize {
        (self.frames.len() - self.pos) / self.channels.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collects all remaining frames as interleaved scalars.
    pub fn into_vec(self) -> Vec<f32> {
        self.frames[self.pos..].to_vec()
    }
}

impl Iterator for SampleStream {
    /// One frame: `channels` interleaved scalar samples.
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        let ch = self.channels.max(1) as usize;
        if self.pos + ch > self.frames.len() {
            return None;
        }
        let frame = self.frames[self.pos..self.pos + ch].to_vec();
        self.pos += ch;
        Some(frame)
    }
}

/// Append-only, growable store of interleaved floating-point PCM samples.
///
/// Appends are serialized against each other and against reads by an
/// `RwLock`: many concurrent readers, one appender at a time. Once appended,
/// samples are never rewritten or removed, and `length()` only grows.
pub struct ContinuousBuffer {
    format: AudioFormat,
    data: RwLock<Vec<f32>>,
}

impl ContinuousBuffer {
    pub fn new(format: AudioFormat) -> Self {
        ContinuousBuffer {
            format,
            data: RwLock::new(Vec::new()),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Appends a finite run of interleaved frames. `frames` must yield
    /// `format.channels` scalars per logical frame; returns the number of
    /// frames appended.
    pub fn append(&self, frames: impl IntoIterator<Item = Vec<f32>>) -> usize {
        let ch = self.format.channels.max(1) as usize;
        let mut buf = self.data.write();
        let mut appended = 0usize;
        for frame in frames {
            debug_assert_eq!(frame.len(), ch, "frame width must match channel count");
            buf.extend_from_slice(&frame);
            appended += 1;
        }
        appended
    }

    /// Appends raw interleaved scalars directly (`scalars.len()` must be a
    /// multiple of the channel count).
    pub fn append_interleaved(&self, scalars: &[f32]) -> usize {
        let ch = self.format.channels.max(1) as usize;
        debug_assert_eq!(scalars.len() % ch, 0, "scalar run must be frame-aligned");
        let mut buf = self.data.write();
        buf.extend_from_slice(scalars);
        scalars.len() / ch
    }

    /// Number of frames currently stored. Monotonically non-decreasing.
    pub fn length(&self) -> usize {
        let ch = self.format.channels.max(1) as usize;
        self.data.read().len() / ch
    }

    /// Reads exactly `count` frames starting at `offset`. Fails if
    /// `offset + count` exceeds `length()` at the time of the call; later
    /// growth of the buffer is never reflected in an already-issued reader.
    pub fn read(&self, offset: usize, count: usize) -> Result<SampleStream, BufferError> {
        let ch = self.format.channels.max(1) as usize;
        let buf = self.data.read();
        let available = buf.len() / ch;
        if offset + count > available {
            return Err(BufferError::OutOfRange {
                requested: offset + count,
                available,
            });
        }
        let start = offset * ch;
        let end = start + count * ch;
        Ok(SampleStream::new(buf[start..end].to_vec(), self.format.channels))
    }

    /// Reads from `offset` to the end of the buffer, truncating rather than
    /// failing if `offset` is beyond the current length.
    pub fn read_truncating(&self, offset: usize, count: usize) -> SampleStream {
        let ch = self.format.channels.max(1) as usize;
        let buf = self.data.read();
        let available = buf.len() / ch;
        let offset = offset.min(available);
        let end_frame = (offset + count).min(available);
        let start = offset * ch;
        let end = end_frame * ch;
        SampleStream::new(buf[start..end].to_vec(), self.format.channels)
    }

    /// An open-ended stream of all frames currently available from `offset`
    /// onward. Does not block for samples appended after this call returns;
    /// repeated calls observe the buffer's state at call time.
    pub fn stream_from(&self, offset: usize) -> SampleStream {
        let ch = self.format.channels.max(1) as usize;
        let buf = self.data.read();
        let available = buf.len() / ch;
        let offset = offset.min(available);
        SampleStream::new(buf[offset * ch..].to_vec(), self.format.channels)
    }
}

impl fmt::Debug for ContinuousBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousBuffer")
            .field("format", &self.format)
            .field("length", &self.length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(rate: u32) -> AudioFormat {
        AudioFormat::new(rate, 1)
    }

    #[test]
    fn append_grows_length_by_exact_frame_count() {
        let buf = ContinuousBuffer::new(mono(16_000));
        let n = buf.append((0..100).map(|i| vec![i as f32]));
        assert_eq!(n, 100);
        assert_eq!(buf.length(), 100);
        buf.append((0..50).map(|i| vec![i as f32]));
        assert_eq!(buf.length(), 150);
    }

    #[test]
    fn read_exact_window_matches_appended_values() {
        let buf = ContinuousBuffer::new(mono(16_000));
        buf.append((0..10).map(|i| vec![i as f32]));
        let got: Vec<f32> = buf.read(2, 3).unwrap().map(|f| f[0]).collect();
        assert_eq!(got, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn read_beyond_length_fails() {
        let buf = ContinuousBuffer::new(mono(16_000));
        buf.append((0..5).map(|i| vec![i as f32]));
        assert!(buf.read(3, 5).is_err());
    }

    #[test]
    fn read_truncating_never_fails() {
        let buf = ContinuousBuffer::new(mono(16_000));
        buf.append((0..5).map(|i| vec![i as f32]));
        let s = buf.read_truncating(3, 100);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn empty_buffer_has_zero_length_and_empty_reads() {
        let buf = ContinuousBuffer::new(mono(16_000));
        assert_eq!(buf.length(), 0);
        assert_eq!(buf.read(0, 0).unwrap().len(), 0);
        assert!(buf.read(0, 1).is_err());
    }
}
