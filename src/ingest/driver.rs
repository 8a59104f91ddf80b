//! Drives a [`TrackStreamer`] into a [`Track`], chunking decoded PCM into
//! 100ms segments and recording the `audio` event that is the sole trigger
//! for downstream VAD and debounce work.

use std::sync::Arc;

use log::{info, warn};

use crate::bus::{AudioAppended, AUDIO};
use crate::ingest::streamer::{RtpSource, TrackStreamer};
use crate::ingest::tee::OpusOggTee;
use crate::timeline::{AudioFormat, Track};

const CHUNK_MS: u32 = 100;

/// Wraps an [`RtpSource`], forwarding every packet's raw payload to an Ogg
/// tee before handing it on to the decoder.
pub struct TeeingSource<S: RtpSource, W: std::io::Write> {
    inner: S,
    tee: OpusOggTee<W>,
}

impl<S: RtpSource, W: std::io::Write> TeeingSource<S, W> {
    pub fn new(inner: S, tee: OpusOggTee<W>) -> Self {
        TeeingSource { inner, tee }
    }
}

impl<S: RtpSource, W: std::io::Write + Send> RtpSource for TeeingSource<S, W> {
    fn recv(&mut self) -> Option<rtp::packet::Packet> {
        let pkt = self.inner.recv()?;
        if let Err(e) = self.tee.write_packet(&pkt.payload) {
            warn!("ogg tee write failed: {}", e);
        }
        Some(pkt)
    }
}

/// Runs until the RTP source is exhausted, appending decoded PCM to `track`
/// in fixed-size chunks and recording one `audio` event per chunk.
pub fn drive<S: RtpSource>(track: Arc<Track>, mut streamer: TrackStreamer<S>) {
    let chunk_frames = (track.format().sample_rate_hz * CHUNK_MS / 1000) as usize;
    let mut chunk: Vec<Vec<f32>> = Vec::with_capacity(chunk_frames);

    loop {
        match streamer.next_frame() {
            Some(frame) => {
                chunk.push(frame);
                if chunk.len() >= chunk_frames {
                    flush_chunk(&track, &mut chunk);
                }
            }
            None => {
                if !chunk.is_empty() {
                    flush_chunk(&track, &mut chunk);
                }
                info!("track {}: rtp source exhausted, stopping ingestion", track.id);
                break;
            }
        }
    }
}

fn flush_chunk(track: &Arc<Track>, chunk: &mut Vec<Vec<f32>>) {
    let prev_end = track.end();
    let appended = track.append_audio(chunk.drain(..));
    if appended == 0 {
        return;
    }
    let new_end = track.end();
    track.span(prev_end, new_end).record_event(AUDIO, AudioAppended);
}

/// Builds the mono/stereo target format ingestion normalizes every track to.
pub fn ingestion_format() -> AudioFormat {
    AudioFormat::MONO_16K
}

#[cfg(feature = "webrtc-streaming")]
pub mod remote {
    use super::*;
    use crate::ingest::streamer::IngestError;
    use crossbeam::channel::{bounded, Receiver, Sender};
    use std::sync::Arc as StdArc;
    use webrtc::track::track_remote::TrackRemote;

    /// Bridges an async `TrackRemote`'s RTP reads to the blocking
    /// [`RtpSource`] interface `TrackStreamer` expects, via a bounded
    /// channel sized to the reorder buffer.
    pub struct ChannelRtpSource {
        rx: Receiver<rtp::packet::Packet>,
    }

    impl RtpSource for ChannelRtpSource {
        fn recv(&mut self) -> Option<rtp::packet::Packet> {
            self.rx.recv().ok()
        }
    }

    /// Spawns the async read loop and returns the paired source. The loop
    /// exits (closing the channel) when the remote track ends.
    pub fn spawn_reader(track: StdArc<TrackRemote>) -> ChannelRtpSource {
        let (tx, rx): (Sender<rtp::packet::Packet>, Receiver<rtp::packet::Packet>) = bounded(32);
        tokio::spawn(async move {
            loop {
                match track.read_rtp().await {
                    Ok((pkt, _attrs)) => {
                        if tx.send(pkt).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("track {}: rtp read ended: {}", track.id(), e);
                        break;
                    }
                }
            }
        });
        ChannelRtpSource { rx }
    }

    pub fn map_ingest_err(e: IngestError) -> IngestError {
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Event, Handler, Session};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptySource;
    impl RtpSource for EmptySource {
        fn recv(&mut self) -> Option<rtp::packet::Packet> {
            None
        }
    }

    struct CountingHandler(Arc<AtomicUsize>);
    impl Handler for CountingHandler {
        fn handle(&self, event: &Event) {
            if event.meta.event_type == AUDIO {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn exhausted_source_produces_no_chunks() {
        crate::bus::register_builtin_types();
        let session = Session::new();
        let count = Arc::new(AtomicUsize::new(0));
        session.listen(Arc::new(CountingHandler(count.clone())));
        let track = session.new_track_at(crate::timeline::Timestamp::ZERO, AudioFormat::MONO_16K);

        let streamer = TrackStreamer::new(EmptySource, AudioFormat::MONO_16K).unwrap();
        drive(track, streamer);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
