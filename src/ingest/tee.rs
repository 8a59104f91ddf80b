//! Writes a parallel, valid single-stream Ogg/Opus file alongside decoding,
//! so the raw encoded audio survives independent of the timeline model.

use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use std::io::{self, Write};

fn opus_head(channels: u8, sample_rate_hz: u32) -> Vec<u8> {
    // RFC 7845 section 5.1.
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1); // version
    head.push(channels);
    head.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
    head.extend_from_slice(&sample_rate_hz.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes()); // output gain
    head.push(0); // channel mapping family
    head
}

fn opus_tags() -> Vec<u8> {
    // RFC 7845 section 5.2: vendor string + zero user comments.
    let vendor = b"sessioncore";
    let mut tags = Vec::with_capacity(8 + 4 + vendor.len() + 4);
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&0u32.to_le_bytes()); // user comment count
    tags
}

/// Tees raw Opus RTP payloads into a single-stream Ogg container at a fixed
/// serial number, one tee per track.
pub struct OpusOggTee<W: Write> {
    writer: PacketWriter<W>,
    serial: u32,
    granule_pos: u64,
    samples_per_packet: u64,
    started: bool,
}

impl<W: Write> OpusOggTee<W> {
    pub fn new(sink: W, serial: u32, channels: u8, sample_rate_hz: u32) -> Self {
        OpusOggTee {
            writer: PacketWriter::new(sink),
            serial,
            granule_pos: 0,
            samples_per_packet: (sample_rate_hz / 50) as u64, // 20ms frames
            started: false,
        }
        .with_headers(channels, sample_rate_hz)
    }

    fn with_headers(mut self, channels: u8, sample_rate_hz: u32) -> Self {
        let head = opus_head(channels, sample_rate_hz);
        let tags = opus_tags();
        if self
            .writer
            .write_packet(head, self.serial, PacketWriteEndInfo::NormalPacket, 0)
            .is_ok()
            && self
                .writer
                .write_packet(tags, self.serial, PacketWriteEndInfo::NormalPacket, 0)
                .is_ok()
        {
            self.started = true;
        }
        self
    }

    /// Writes one raw Opus packet (an RTP payload) as an Ogg page entry.
    pub fn write_packet(&mut self, opus_payload: &[u8]) -> io::Result<()> {
        self.granule_pos += self.samples_per_packet;
        self.writer
            .write_packet(
                opus_payload.to_vec(),
                self.serial,
                PacketWriteEndInfo::NormalPacket,
                self.granule_pos,
            )
            .map_err(io::Error::other)
    }

    /// Flushes the final Ogg page, marking the stream as ended.
    pub fn finish(&mut self, last_payload: &[u8]) -> io::Result<()> {
        self.granule_pos += self.samples_per_packet;
        self.writer
            .write_packet(
                last_payload.to_vec(),
                self.serial,
                PacketWriteEndInfo::EndStream,
                self.granule_pos,
            )
            .map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bytes_match_rfc7845_magic_and_version() {
        let head = opus_head(1, 16_000);
        assert_eq!(&head[0..8], b"OpusHead");
        assert_eq!(head[8], 1);
        assert_eq!(head[9], 1); // mono

        let tags = opus_tags();
        assert_eq!(&tags[0..8], b"OpusTags");
    }

    #[test]
    fn writing_packets_to_an_in_memory_sink_succeeds() {
        let mut tee = OpusOggTee::new(Vec::new(), 1, 1, 16_000);
        assert!(tee.started);
        tee.write_packet(&[1, 2, 3]).unwrap();
        tee.finish(&[4, 5, 6]).unwrap();
    }
}
