//! Datagram layout for the benchmark stream.
//!
//! ```text
//! ┌──────────────┬──────────────┬────────────────────┐
//! │    Marker    │    Length    │       Filler       │
//! │   (4 bytes)  │ (4 bytes LE) │     (variable)     │
//! └──────────────┴──────────────┴────────────────────┘
//! ```
//!
//! A data packet is valid when the length field equals the number of bytes
//! actually received. A datagram whose first four bytes are `quit` is the
//! control packet that ends a session; nothing after the marker is looked at.

use std::ops::Range;

/// Largest datagram either side sends or receives.
pub const MAX_DATAGRAM: usize = 1468;

/// Marker + length field.
pub const HEADER_LEN: usize = 8;

pub const QUIT_MARKER: [u8; 4] = *b"quit";

/// Marker carried by data packets. The server does not check it.
pub const DATA_MARKER: [u8; 4] = *b"ubv1";

/// Lengths the generator draws data packets from (upper bound exclusive).
pub const PAYLOAD_LEN_RANGE: Range<usize> = 1200..MAX_DATAGRAM;

/// What the server makes of a single datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Quit,
    Bad,
    Good,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub marker: [u8; 4],
    /// Declared total packet length, header included.
    pub packet_length: u32,
}

impl PacketHeader {
    pub fn new(packet_length: u32) -> Self {
        Self {
            marker: DATA_MARKER,
            packet_length,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.marker);
        out[4..].copy_from_slice(&self.packet_length.to_le_bytes());
        out
    }

    /// Returns `None` when `buf` is too short to hold a header.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }

        let mut marker = [0u8; 4];
        marker.copy_from_slice(&buf[..4]);
        let mut length = [0u8; 4];
        length.copy_from_slice(&buf[4..HEADER_LEN]);

        Some(Self {
            marker,
            packet_length: u32::from_le_bytes(length),
        })
    }
}

pub fn is_quit(buf: &[u8]) -> bool {
    buf.len() >= QUIT_MARKER.len() && buf[..QUIT_MARKER.len()] == QUIT_MARKER
}

/// Classifies one received datagram. `buf` must be exactly the received bytes.
pub fn classify(buf: &[u8]) -> PacketKind {
    if is_quit(buf) {
        return PacketKind::Quit;
    }

    match PacketHeader::decode(buf) {
        Some(header) if header.packet_length as usize == buf.len() => PacketKind::Good,
        _ => PacketKind::Bad,
    }
}

/// Reusable send buffer for data packets.
///
/// The marker and filler are written once; each `frame` call only rewrites the
/// length field, so consecutive packets share the same filler bytes.
pub struct DataPacket {
    buf: [u8; MAX_DATAGRAM],
}

impl DataPacket {
    /// Builds the buffer with `filler` repeated across the payload area.
    /// An empty filler leaves the payload zeroed.
    pub fn with_filler(filler: &[u8]) -> Self {
        let mut buf = [0u8; MAX_DATAGRAM];
        buf[..4].copy_from_slice(&DATA_MARKER);

        if !filler.is_empty() {
            for (dst, src) in buf[HEADER_LEN..].iter_mut().zip(filler.iter().cycle()) {
                *dst = *src;
            }
        }

        Self { buf }
    }

    /// Stamps `len` into the header and returns the first `len` bytes.
    /// `len` is clamped to `HEADER_LEN..=MAX_DATAGRAM`.
    pub fn frame(&mut self, len: usize) -> &[u8] {
        let len = len.clamp(HEADER_LEN, MAX_DATAGRAM);
        self.buf[4..HEADER_LEN].copy_from_slice(&(len as u32).to_le_bytes());
        &self.buf[..len]
    }
}

impl Default for DataPacket {
    fn default() -> Self {
        Self::with_filler(&[])
    }
}

/// Cuts a reply down to what fits in one datagram.
pub fn clip_reply(reply: &[u8]) -> &[u8] {
    &reply[..reply.len().min(MAX_DATAGRAM)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_packet(len: usize) -> Vec<u8> {
        let mut packet = vec![0xAB; len];
        packet[..HEADER_LEN].copy_from_slice(&PacketHeader::new(len as u32).encode());
        packet
    }

    #[test]
    fn header_roundtrip_is_little_endian() {
        let header = PacketHeader::new(0x0102_0304);
        let bytes = header.encode();
        assert_eq!(&bytes[..4], b"ubv1");
        assert_eq!(&bytes[4..], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(PacketHeader::decode(&bytes), Some(header));
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert_eq!(PacketHeader::decode(&[0u8; 7]), None);
        assert_eq!(PacketHeader::decode(&[]), None);
    }

    #[test]
    fn consistent_length_is_good() {
        for len in [HEADER_LEN, 9, 1200, 1467, MAX_DATAGRAM] {
            assert_eq!(classify(&data_packet(len)), PacketKind::Good, "len {len}");
        }
    }

    #[test]
    fn mismatched_length_is_bad() {
        let mut packet = data_packet(1300);
        packet.truncate(1299);
        assert_eq!(classify(&packet), PacketKind::Bad);

        let mut packet = data_packet(1300);
        packet.push(0);
        assert_eq!(classify(&packet), PacketKind::Bad);
    }

    #[test]
    fn shorter_than_header_is_bad() {
        assert_eq!(classify(&[]), PacketKind::Bad);
        assert_eq!(classify(b"q"), PacketKind::Bad);
        assert_eq!(classify(b"qui"), PacketKind::Bad);
        assert_eq!(classify(&[7, 0, 0, 0, 7, 0, 0]), PacketKind::Bad);
    }

    #[test]
    fn quit_marker_wins_regardless_of_tail() {
        assert_eq!(classify(b"quit"), PacketKind::Quit);
        assert_eq!(classify(b"quit now please"), PacketKind::Quit);

        // A quit marker followed by a consistent length field is still a quit.
        let mut packet = data_packet(64);
        packet[..4].copy_from_slice(&QUIT_MARKER);
        assert_eq!(classify(&packet), PacketKind::Quit);
    }

    #[test]
    fn quit_is_case_sensitive() {
        assert_eq!(classify(b"QUIT"), PacketKind::Bad);
    }

    #[test]
    fn data_packet_frames_carry_their_length() {
        let mut packet = DataPacket::with_filler(b"hello");
        for len in [1200, 1467, 1234] {
            let frame = packet.frame(len).to_vec();
            assert_eq!(frame.len(), len);
            assert_eq!(&frame[..4], &DATA_MARKER);
            assert_eq!(&frame[8..13], b"hello");
            assert_eq!(&frame[13..18], b"hello");
            assert_eq!(classify(&frame), PacketKind::Good);
        }
    }

    #[test]
    fn data_packet_clamps_out_of_range_lengths() {
        let mut packet = DataPacket::default();
        assert_eq!(packet.frame(0).len(), HEADER_LEN);
        assert_eq!(packet.frame(10_000).len(), MAX_DATAGRAM);
        assert_eq!(classify(packet.frame(10_000)), PacketKind::Good);
    }

    #[test]
    fn data_marker_never_reads_as_quit() {
        assert!(!is_quit(DataPacket::default().frame(1200)));
    }

    #[test]
    fn clip_reply_caps_at_datagram_size() {
        let long = vec![b'x'; MAX_DATAGRAM + 100];
        assert_eq!(clip_reply(&long).len(), MAX_DATAGRAM);
        assert_eq!(clip_reply(b"short"), b"short");
    }
}
