//! Wire-format definitions for STP segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw datagram back into a [`Segment`].
//! - Computing and verifying the payload checksum.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags     |                                               |
//! +-+-+-+-+-+-+-+-+                   Checksum                    +
//! |                                                               |
//! +               +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |              Payload ...                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 17 bytes.
//! seq(4) + ack(4) + flags(1) + checksum(8)
//!
//! The checksum is a CRC-32 computed over the **payload only**, stored
//! widened into the 8-byte field.  Control segments (no payload) carry zero.
//! Decoding does *not* verify the checksum: the receiver decides what to do
//! with a mismatch (drop without ACK), so verification is an explicit step
//! via [`Segment::verify_checksum`].

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0b0000_0001;
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u8 = 0b0000_0010;
    /// Finish — sender has no more data to send.
    pub const FIN: u8 = 0b0000_0100;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 17;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_CHECKSUM: usize = 9;

/// A complete STP datagram: fixed header fields + payload bytes.
///
/// Fields are in host byte order; [`Segment::encode`] converts to big-endian
/// on the wire and [`Segment::decode`] converts back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Sequence number of the first payload byte in this segment.
    pub seq: u32,
    /// Cumulative acknowledgement number: all bytes before it were received.
    pub ack: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// CRC-32 over the payload, widened to 64 bits.  Zero for control segments.
    pub checksum: u64,
    /// Application bytes carried by this segment (empty for control segments).
    pub payload: Vec<u8>,
}

impl Segment {
    /// Build a data segment, computing the payload checksum.
    ///
    /// Data segments carry no flags; they are identified by a non-empty
    /// payload and summarised as `D` in the event log.
    pub fn data(seq: u32, ack: u32, payload: Vec<u8>) -> Self {
        let checksum = payload_checksum(&payload);
        Self {
            seq,
            ack,
            flags: 0,
            checksum,
            payload,
        }
    }

    /// Build a payload-less control segment (SYN / ACK / FIN combinations).
    pub fn control(flags: u8, seq: u32, ack: u32) -> Self {
        Self {
            seq,
            ack,
            flags,
            checksum: 0,
            payload: Vec::new(),
        }
    }

    /// Serialise this segment into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_FLAGS] = self.flags;
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 8].copy_from_slice(&self.checksum.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Segment`] from a raw datagram.
    ///
    /// Everything after the header is payload.  Returns [`Err`] only when
    /// `buf` is too short to contain a header; the checksum is *not* checked
    /// here (see [`Segment::verify_checksum`]).
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::BufferTooShort);
        }

        let seq = u32::from_be_bytes(buf[OFF_SEQ..OFF_SEQ + 4].try_into().unwrap());
        let ack = u32::from_be_bytes(buf[OFF_ACK..OFF_ACK + 4].try_into().unwrap());
        let flags = buf[OFF_FLAGS];
        let checksum = u64::from_be_bytes(buf[OFF_CHECKSUM..OFF_CHECKSUM + 8].try_into().unwrap());

        Ok(Segment {
            seq,
            ack,
            flags,
            checksum,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

    /// Recompute the payload checksum and compare against the header field.
    ///
    /// A mismatch means the payload was corrupted in flight; the receiver
    /// must drop the segment without acknowledging it.
    pub fn verify_checksum(&self) -> bool {
        payload_checksum(&self.payload) == self.checksum
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    /// Single-letter flag summary for the event log.
    ///
    /// `SA` for SYN+ACK, then `S`, `A`, `F`, and `D` for plain data.
    pub fn flag_summary(&self) -> &'static str {
        if self.is_syn() && self.is_ack() {
            "SA"
        } else if self.is_syn() {
            "S"
        } else if self.is_ack() {
            "A"
        } else if self.is_fin() {
            "F"
        } else {
            "D"
        }
    }
}

/// CRC-32 over `payload`, widened to the 8-byte wire representation.
pub fn payload_checksum(payload: &[u8]) -> u64 {
    u64::from(crc32fast::hash(payload))
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum SegmentError {
    /// Buffer shorter than the fixed header size.
    BufferTooShort,
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentError::BufferTooShort => write!(f, "buffer too short to contain a header"),
        }
    }
}

impl std::error::Error for SegmentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let seg = Segment::data(42, 7, b"hello".to_vec());
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded, seg);
    }

    #[test]
    fn control_roundtrip_empty_payload() {
        let seg = Segment::control(flags::SYN | flags::ACK, 0, 1001);
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded.payload, Vec::<u8>::new());
        assert_eq!(decoded.checksum, 0);
        assert_eq!(decoded, seg);
    }

    #[test]
    fn header_len_constant_is_correct() {
        // seq(4) + ack(4) + flags(1) + checksum(8) = 17
        assert_eq!(HEADER_LEN, 17);
        let seg = Segment::control(0, 0, 0);
        assert_eq!(seg.encode().len(), HEADER_LEN);
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let payload = b"exactly twelve!".to_vec();
        let n = payload.len();
        assert_eq!(Segment::data(0, 0, payload).encode().len(), HEADER_LEN + n);
    }

    #[test]
    fn seq_ack_big_endian_on_wire() {
        let bytes = Segment::control(0, 0x0102_0304, 0x0506_0708).encode();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn checksum_big_endian_on_wire() {
        let seg = Segment::data(0, 0, b"abc".to_vec());
        let bytes = seg.encode();
        let field = u64::from_be_bytes(bytes[OFF_CHECKSUM..OFF_CHECKSUM + 8].try_into().unwrap());
        assert_eq!(field, seg.checksum);
        assert_eq!(field, payload_checksum(b"abc"));
    }

    #[test]
    fn flag_bit_positions() {
        // bit 0 = ACK, bit 1 = SYN, bit 2 = FIN
        assert_eq!(flags::ACK, 0b001);
        assert_eq!(flags::SYN, 0b010);
        assert_eq!(flags::FIN, 0b100);
        let bytes = Segment::control(flags::SYN | flags::ACK, 0, 0).encode();
        assert_eq!(bytes[OFF_FLAGS], 0b011);
    }

    #[test]
    fn decode_short_buffer_returns_error() {
        assert_eq!(Segment::decode(&[]), Err(SegmentError::BufferTooShort));
        assert_eq!(
            Segment::decode(&[0u8; HEADER_LEN - 1]),
            Err(SegmentError::BufferTooShort)
        );
    }

    #[test]
    fn checksum_detects_single_bit_flip() {
        let payload = b"the quick brown fox".to_vec();
        let seg = Segment::data(0, 0, payload.clone());
        assert!(seg.verify_checksum());

        // Flip every single bit in turn; the CRC must catch all of them.
        for byte in 0..payload.len() {
            for bit in 0..8 {
                let mut corrupted = seg.clone();
                corrupted.payload[byte] ^= 1 << bit;
                assert!(
                    !corrupted.verify_checksum(),
                    "flip at byte {byte} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn checksum_detects_whole_byte_inversion() {
        // The corrupt stage of the impairment simulator flips all bits of
        // the first payload byte.
        let seg = Segment::data(100, 0, vec![0x5a, 0x01, 0x02]);
        let mut bytes = seg.encode();
        bytes[HEADER_LEN] = !bytes[HEADER_LEN];
        let decoded = Segment::decode(&bytes).unwrap();
        assert!(!decoded.verify_checksum());
    }

    #[test]
    fn flag_summary_letters() {
        assert_eq!(Segment::control(flags::SYN, 0, 0).flag_summary(), "S");
        assert_eq!(Segment::control(flags::ACK, 0, 0).flag_summary(), "A");
        assert_eq!(Segment::control(flags::FIN, 0, 0).flag_summary(), "F");
        assert_eq!(
            Segment::control(flags::SYN | flags::ACK, 0, 0).flag_summary(),
            "SA"
        );
        assert_eq!(Segment::data(0, 0, b"x".to_vec()).flag_summary(), "D");
    }
}
