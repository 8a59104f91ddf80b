//! RTP → PCM decode pipeline for one remote track.

use std::collections::VecDeque;
use std::fmt;

use crate::timeline::AudioFormat;

#[derive(Debug)]
pub enum IngestError {
    Decode(opus::Error),
    SourceClosed,
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Decode(e) => write!(f, "opus decode error: {}", e),
            IngestError::SourceClosed => write!(f, "rtp source closed"),
        }
    }
}

impl std::error::Error for IngestError {}

/// A source of RTP packets, pulled one at a time. The real implementation
/// (`ingest::driver`, behind the `webrtc-streaming` feature) bridges an
/// async `TrackRemote` read loop to this blocking interface over a
/// bounded channel; tests use a plain in-memory queue.
pub trait RtpSource: Send {
    /// Blocks for the next packet. Returns `None` once the source is
    /// exhausted (remote track ended, or the bridging channel closed).
    fn recv(&mut self) -> Option<rtp::packet::Packet>;
}

/// Orders packets by RTP sequence number (with wraparound) before they're
/// handed to the decoder, tolerating capacity-bounded out-of-order arrival.
pub struct ReorderBuffer {
    capacity: usize,
    packets: VecDeque<rtp::packet::Packet>,
}

fn seq_less(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) < 0
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        ReorderBuffer {
            capacity,
            packets: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, pkt: rtp::packet::Packet) {
        let seq = pkt.header.sequence_number;
        let pos = self
            .packets
            .iter()
            .position(|p| seq_less(seq, p.header.sequence_number))
            .unwrap_or(self.packets.len());
        self.packets.insert(pos, pkt);
    }

    /// Pops the oldest packet once the buffer has filled to capacity.
    pub fn pop(&mut self) -> Option<rtp::packet::Packet> {
        if self.packets.len() >= self.capacity {
            self.packets.pop_front()
        } else {
            None
        }
    }

    /// Pops whatever is buffered, ignoring capacity. Used to drain on
    /// end-of-stream so the last few packets aren't lost.
    pub fn flush_one(&mut self) -> Option<rtp::packet::Packet> {
        self.packets.pop_front()
    }
}

/// Decodes one remote Opus track into floating-point PCM at `target`,
/// up/down-mixing channels as needed. Exposes a lazy per-frame iterator via
/// [`TrackStreamer::next_frame`].
pub struct TrackStreamer<S: RtpSource> {
    source: S,
    reorder: ReorderBuffer,
    decoder: opus::Decoder,
    decode_buf: Vec<f32>,
    /// Residual decoded samples not yet handed out, interleaved at the
    /// decoder's native channel count.
    residual: VecDeque<f32>,
    native_channels: u16,
    target: AudioFormat,
    source_exhausted: bool,
}

const REORDER_CAPACITY: usize = 20;
const DECODE_BUF_MS: u32 = 60;

impl<S: RtpSource> TrackStreamer<S> {
    pub fn new(source: S, target: AudioFormat) -> Result<Self, IngestError> {
        let native_channels = target.channels.max(1);
        let channels = if native_channels > 1 {
            opus::Channels::Stereo
        } else {
            opus::Channels::Mono
        };
        let decoder = opus::Decoder::new(target.sample_rate_hz, channels).map_err(IngestError::Decode)?;
        let decode_buf_len =
            (target.sample_rate_hz / 1000 * DECODE_BUF_MS) as usize * native_channels as usize;
        Ok(TrackStreamer {
            source,
            reorder: ReorderBuffer::new(REORDER_CAPACITY),
            decoder,
            decode_buf: vec![0.0; decode_buf_len],
            residual: VecDeque::new(),
            native_channels,
            target,
            source_exhausted: false,
        })
    }

    fn decode_next_packet(&mut self) -> Result<usize, IngestError> {
        loop {
            if let Some(pkt) = self.reorder.pop() {
                return self.decode_packet(&pkt);
            }
            match self.source.recv() {
                Some(pkt) => self.reorder.push(pkt),
                None => {
                    self.source_exhausted = true;
                    if let Some(pkt) = self.reorder.flush_one() {
                        return self.decode_packet(&pkt);
                    }
                    return Err(IngestError::SourceClosed);
                }
            }
        }
    }

    fn decode_packet(&mut self, pkt: &rtp::packet::Packet) -> Result<usize, IngestError> {
        self.decoder
            .decode_float(&pkt.payload, &mut self.decode_buf, false)
            .map_err(IngestError::Decode)
    }

    fn fill_residual(&mut self) -> bool {
        while self.residual.is_empty() {
            match self.decode_next_packet() {
                Ok(samples_per_channel) => {
                    let n = samples_per_channel * self.native_channels as usize;
                    self.residual.extend(self.decode_buf[..n].iter().copied());
                }
                Err(IngestError::SourceClosed) => return false,
                Err(_) => continue, // bad packet: try the next one
            }
        }
        true
    }

    /// Pulls one frame at the target channel count, up-mixing mono to
    /// stereo by duplication or down-mixing stereo to mono by averaging.
    /// Returns `None` once the underlying RTP source is exhausted.
    pub fn next_frame(&mut self) -> Option<Vec<f32>> {
        if !self.fill_residual() {
            return None;
        }
        let left = self.residual.pop_front()?;
        let right = if self.native_channels > 1 {
            self.residual.pop_front().unwrap_or(left)
        } else {
            left
        };

        Some(match self.target.channels {
            1 => vec![(left + right) / 2.0],
            _ => vec![left, right],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque as Q;

    struct QueueSource(Q<rtp::packet::Packet>);
    impl RtpSource for QueueSource {
        fn recv(&mut self) -> Option<rtp::packet::Packet> {
            self.0.pop_front()
        }
    }

    #[test]
    fn reorder_buffer_releases_fifo_once_at_capacity() {
        let mut buf = ReorderBuffer::new(2);
        assert!(buf.pop().is_none());
        buf.push(make_packet(1));
        assert!(buf.pop().is_none());
        buf.push(make_packet(2));
        let popped = buf.pop().unwrap();
        assert_eq!(popped.header.sequence_number, 1);
    }

    #[test]
    fn reorder_buffer_sorts_out_of_order_arrivals() {
        let mut buf = ReorderBuffer::new(1);
        buf.push(make_packet(5));
        buf.push(make_packet(3));
        buf.push(make_packet(4));
        assert_eq!(buf.pop().unwrap().header.sequence_number, 3);
        assert_eq!(buf.pop().unwrap().header.sequence_number, 4);
    }

    fn make_packet(seq: u16) -> rtp::packet::Packet {
        let mut pkt = rtp::packet::Packet::default();
        pkt.header.sequence_number = seq;
        pkt
    }
}
