//! Responder reassembly buffer.
//!
//! [`ReassemblyBuffer`] places arriving payload bytes at the slot derived
//! from their sequence number and tracks how far the received prefix is
//! contiguous:
//!
//! - Slot index is `(seq − sender_isn − 1) / MSS`.
//! - Out-of-order segments are buffered by position, not rejected.
//! - Duplicate delivery overwrites the slot (idempotent).
//! - The cumulative ACK only ever advances to the next contiguous byte; the
//!   contiguous high-watermark is tracked separately from "any bytes
//!   received" so a gap is never acknowledged past.
//! - Flushing concatenates slots in index order and stops at the first
//!   unfilled slot.
//!
//! The responder does not know the transfer length up front, so the slot
//! vector grows on demand.  This module only manages state; all socket and
//! file I/O is the caller's responsibility.

/// Reassembly state for one inbound transfer.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    /// Peer's ISN; the first data byte carries `sender_isn + 1`.
    sender_isn: u32,
    /// Segment size learned from the first data datagram.
    mss: usize,
    /// Payload bytes by segment index; `None` marks "not yet received".
    slots: Vec<Option<Vec<u8>>>,
    /// Number of contiguous filled slots from index 0.
    contiguous_slots: usize,
    /// Total bytes in the contiguous prefix.
    contiguous_bytes: u32,
}

impl ReassemblyBuffer {
    /// Create a buffer once the MSS is known (from the first data segment).
    pub fn new(sender_isn: u32, mss: usize) -> Self {
        assert!(mss >= 1, "MSS must be at least 1");
        Self {
            sender_isn,
            mss,
            slots: Vec::new(),
            contiguous_slots: 0,
            contiguous_bytes: 0,
        }
    }

    /// Store a (checksum-verified) payload at the slot its sequence number
    /// maps to.
    ///
    /// Returns `false` for a segment whose sequence number falls before the
    /// first data byte — there is no non-negative index for it.  Everything
    /// else is stored, growing the slot vector as needed.
    pub fn insert(&mut self, seq: u32, payload: &[u8]) -> bool {
        let offset = seq.wrapping_sub(self.sender_isn).wrapping_sub(1);
        // A wrapped subtraction of a too-small seq lands in the far half of
        // the u32 range; reject it as a negative offset.
        if offset > u32::MAX / 2 {
            return false;
        }

        let index = offset as usize / self.mss;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(payload.to_vec());
        self.advance_watermark();
        true
    }

    /// Cumulative ACK number: one past the highest contiguous byte received.
    pub fn ack_number(&self) -> u32 {
        self.sender_isn
            .wrapping_add(1)
            .wrapping_add(self.contiguous_bytes)
    }

    /// Bytes received in order, with no gaps, from the start of the stream.
    pub fn contiguous_bytes(&self) -> u32 {
        self.contiguous_bytes
    }

    /// Concatenate the contiguous prefix in index order.
    ///
    /// Stops at the first unfilled slot; under in-order, no-permanent-loss
    /// delivery the absent slots are always a trailing gap, so this yields
    /// the complete transfer.
    pub fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.contiguous_bytes as usize);
        for slot in &self.slots {
            match slot {
                Some(payload) => out.extend_from_slice(payload),
                None => break,
            }
        }
        out
    }

    fn advance_watermark(&mut self) {
        while let Some(Some(payload)) = self.slots.get(self.contiguous_slots) {
            self.contiguous_bytes = self.contiguous_bytes.wrapping_add(payload.len() as u32);
            self.contiguous_slots += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ISN: u32 = 5000;
    const MSS: usize = 100;

    /// Sequence number of the data segment at slot `index`.
    fn seq_at(index: usize) -> u32 {
        ISN + 1 + (index * MSS) as u32
    }

    #[test]
    fn in_order_segments_advance_ack() {
        let mut buf = ReassemblyBuffer::new(ISN, MSS);
        assert_eq!(buf.ack_number(), ISN + 1);

        assert!(buf.insert(seq_at(0), &[b'a'; 100]));
        assert_eq!(buf.ack_number(), ISN + 1 + 100);

        assert!(buf.insert(seq_at(1), &[b'b'; 100]));
        assert_eq!(buf.ack_number(), ISN + 1 + 200);
    }

    #[test]
    fn out_of_order_segment_buffered_but_not_acked_past_gap() {
        let mut buf = ReassemblyBuffer::new(ISN, MSS);

        // Slot 1 arrives before slot 0: stored, but the watermark stays put.
        assert!(buf.insert(seq_at(1), &[b'b'; 100]));
        assert_eq!(buf.ack_number(), ISN + 1);
        assert_eq!(buf.assemble(), Vec::<u8>::new());

        // Filling the gap releases both segments at once.
        assert!(buf.insert(seq_at(0), &[b'a'; 100]));
        assert_eq!(buf.ack_number(), ISN + 1 + 200);
        assert_eq!(buf.assemble().len(), 200);
    }

    #[test]
    fn duplicate_delivery_is_idempotent() {
        let mut buf = ReassemblyBuffer::new(ISN, MSS);
        buf.insert(seq_at(0), &[b'a'; 100]);
        buf.insert(seq_at(0), &[b'a'; 100]);
        assert_eq!(buf.ack_number(), ISN + 1 + 100);
        assert_eq!(buf.assemble().len(), 100);
    }

    #[test]
    fn seq_before_first_data_byte_rejected() {
        let mut buf = ReassemblyBuffer::new(ISN, MSS);
        assert!(!buf.insert(ISN, &[b'x'; 10]));
        assert!(!buf.insert(ISN.wrapping_sub(500), &[b'x'; 10]));
        assert_eq!(buf.ack_number(), ISN + 1);
    }

    #[test]
    fn assemble_stops_at_first_gap() {
        let mut buf = ReassemblyBuffer::new(ISN, MSS);
        buf.insert(seq_at(0), &[b'a'; 100]);
        buf.insert(seq_at(2), &[b'c'; 100]); // slot 1 missing
        let out = buf.assemble();
        assert_eq!(out.len(), 100);
        assert!(out.iter().all(|&b| b == b'a'));
    }

    #[test]
    fn final_short_segment() {
        // 350-byte transfer: 100 + 100 + 100 + 50.
        let mut buf = ReassemblyBuffer::new(ISN, MSS);
        for i in 0..3 {
            buf.insert(seq_at(i), &[b'a' + i as u8; 100]);
        }
        buf.insert(seq_at(3), &[b'd'; 50]);

        assert_eq!(buf.ack_number(), ISN + 1 + 350);
        assert_eq!(buf.assemble().len(), 350);
    }

    #[test]
    fn any_arrival_permutation_reassembles_identically() {
        let payloads: Vec<Vec<u8>> = (0..4u8)
            .map(|i| vec![i; if i == 3 { 28 } else { 100 }])
            .collect();
        let mut expected = Vec::new();
        for p in &payloads {
            expected.extend_from_slice(p);
        }

        // A scrambled, partially duplicated delivery order.
        let order = [2usize, 0, 3, 0, 1, 2];
        let mut buf = ReassemblyBuffer::new(ISN, MSS);
        for &i in &order {
            buf.insert(seq_at(i), &payloads[i]);
        }

        assert_eq!(buf.assemble(), expected);
        assert_eq!(buf.ack_number(), ISN + 1 + expected.len() as u32);
    }

    #[test]
    fn sequence_wrap_around() {
        let isn = u32::MAX - 10;
        let mut buf = ReassemblyBuffer::new(isn, MSS);
        // First data segment's seq wraps past u32::MAX.
        assert!(buf.insert(isn.wrapping_add(1), &[b'a'; 100]));
        assert_eq!(buf.ack_number(), isn.wrapping_add(101));
    }
}
