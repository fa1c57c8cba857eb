//! Initiator send-side state: window accounting and the outstanding-segment
//! ledger.
//!
//! [`SendWindow`] tracks the byte cursors that gate transmission and the
//! per-segment ledger used to retransmit and to sample round-trip times:
//!
//! - New data may be sent only while `unacked_bytes() < MWS`.
//! - ACKs are **cumulative**: `ack = K` means the peer holds every byte
//!   before sequence number `K`.
//! - An ACK repeating the previous peak is a duplicate; the third consecutive
//!   duplicate triggers fast retransmit.
//! - The ledger has one slot per segment the file splits into
//!   (`ceil(file_len / MSS)`); entries record the encoded datagram, the
//!   original send time, and a transmission count.  Entries are never
//!   removed — the oldest unacknowledged one is located by sequence
//!   arithmetic.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.
//!
//! # Sequence-number layout
//!
//! ```text
//!   isn+1      last_byte_acked        last_byte_sent
//!     │               │                     │
//!  ───┼───────────────┼─────────────────────┼───────▶ seq space
//!     │ ◀── acked ──▶ │ ◀──── unacked ────▶ │
//! ```

use std::time::{Duration, Instant};

/// Consecutive duplicate ACKs required to trigger fast retransmit.
const DUP_ACK_THRESHOLD: u32 = 3;

// ---------------------------------------------------------------------------
// LedgerEntry
// ---------------------------------------------------------------------------

/// One transmitted segment in the outstanding-segment ledger.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// The encoded datagram, ready to hand back to the socket on retransmit.
    pub datagram: Vec<u8>,
    /// Wall-clock time of the **original** transmission.  Never refreshed;
    /// RTT samples are always measured from the first send.
    pub first_sent_at: Instant,
    /// Total number of times this segment has been transmitted.
    pub tx_count: u32,
}

// ---------------------------------------------------------------------------
// AckOutcome
// ---------------------------------------------------------------------------

/// What an inbound ACK meant, and what the caller must do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The window advanced.  `rtt_sample` is the time since the covering
    /// segment's original send, or `None` when that segment was ever
    /// retransmitted (Karn's rule: ambiguous samples are discarded).
    Progress { rtt_sample: Option<Duration> },
    /// The ACK repeated the previous peak.  `fast_retransmit` is `true` on
    /// exactly the third consecutive duplicate; the counter has then been
    /// reset and the caller must resend the oldest unacknowledged segment.
    Duplicate { fast_retransmit: bool },
    /// The ACK was below the peak or beyond anything sent; ignored.
    Stale,
}

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Send-side window and ledger state for one connection.
#[derive(Debug)]
pub struct SendWindow {
    /// Initiator's ISN; the first data byte carries `isn + 1`.
    isn: u32,
    /// Maximum segment size in bytes.
    mss: usize,
    /// Maximum window size in bytes (the unacked-byte ceiling).
    mws: usize,
    /// Sequence number one past the last byte handed to the network.
    pub last_byte_sent: u32,
    /// Highest cumulative ACK seen from the peer.
    pub last_byte_acked: u32,
    /// One slot per segment of the file, indexed in send order.
    entries: Vec<Option<LedgerEntry>>,
    /// Ledger slot for the next new segment.
    next_index: usize,
    /// Consecutive duplicate ACKs since the last progress or fast retransmit.
    dup_acks: u32,
    /// Lifetime duplicate-ACK total, for the end-of-run summary.
    pub total_dup_acks: u64,
    /// Lifetime retransmission total, for the end-of-run summary.
    pub total_retransmits: u64,
}

impl SendWindow {
    /// Create a window for a transfer of `file_len` bytes.
    ///
    /// Both cursors start at `isn + 1` (the SYN consumed one sequence
    /// number), so `unacked_bytes()` is zero.
    pub fn new(isn: u32, mss: usize, mws: usize, file_len: u64) -> Self {
        assert!(mss >= 1, "MSS must be at least 1");
        let segments = (file_len as usize).div_ceil(mss);
        Self {
            isn,
            mss,
            mws,
            last_byte_sent: isn.wrapping_add(1),
            last_byte_acked: isn.wrapping_add(1),
            entries: vec![None; segments],
            next_index: 0,
            dup_acks: 0,
            total_dup_acks: 0,
            total_retransmits: 0,
        }
    }

    /// Bytes sent but not yet acknowledged.
    pub fn unacked_bytes(&self) -> u32 {
        self.last_byte_sent.wrapping_sub(self.last_byte_acked)
    }

    /// `true` while the admission gate permits sending new data.
    pub fn can_send(&self) -> bool {
        (self.unacked_bytes() as usize) < self.mws
    }

    /// `true` once every transmitted byte has been acknowledged.
    pub fn all_acked(&self) -> bool {
        self.unacked_bytes() == 0
    }

    /// Record a newly transmitted segment in the next ledger slot and advance
    /// the send cursor by its payload length.
    pub fn record_sent(&mut self, datagram: Vec<u8>, payload_len: usize, now: Instant) {
        debug_assert!(
            self.next_index < self.entries.len(),
            "ledger overflow: slot {} of {}",
            self.next_index,
            self.entries.len()
        );
        self.entries[self.next_index] = Some(LedgerEntry {
            datagram,
            first_sent_at: now,
            tx_count: 1,
        });
        self.next_index += 1;
        self.last_byte_sent = self.last_byte_sent.wrapping_add(payload_len as u32);
    }

    /// Process a cumulative ACK received at `now`.
    pub fn on_ack(&mut self, ack: u32, now: Instant) -> AckOutcome {
        if ack == self.last_byte_acked {
            self.dup_acks += 1;
            self.total_dup_acks += 1;
            if self.dup_acks == DUP_ACK_THRESHOLD {
                self.dup_acks = 0;
                return AckOutcome::Duplicate {
                    fast_retransmit: true,
                };
            }
            return AckOutcome::Duplicate {
                fast_retransmit: false,
            };
        }

        // Reject ACKs behind the peak or beyond anything sent.
        if !seq_le(self.last_byte_acked, ack) || !seq_le(ack, self.last_byte_sent) {
            return AckOutcome::Stale;
        }

        self.last_byte_acked = ack;
        self.dup_acks = 0;

        // Sample RTT from the segment whose payload ends at `ack`, unless it
        // was ever retransmitted (Karn's rule).
        let rtt_sample = self
            .covering_entry(ack)
            .filter(|e| e.tx_count == 1)
            .map(|e| now.duration_since(e.first_sent_at));
        AckOutcome::Progress { rtt_sample }
    }

    /// Clone the oldest unacknowledged segment's datagram for retransmission,
    /// bumping its transmission count.
    ///
    /// Returns `None` when nothing is in flight.
    pub fn retransmit_oldest(&mut self) -> Option<Vec<u8>> {
        if self.all_acked() {
            return None;
        }
        let index = self.oldest_unacked_index();
        let entry = self.entries.get_mut(index)?.as_mut()?;
        entry.tx_count += 1;
        self.total_retransmits += 1;
        Some(entry.datagram.clone())
    }

    /// Ledger index of the oldest unacknowledged segment.
    ///
    /// The first unacked byte is `last_byte_acked`; its offset from the first
    /// data byte (`isn + 1`) divided by MSS is the slot.
    fn oldest_unacked_index(&self) -> usize {
        (self.last_byte_acked.wrapping_sub(self.isn).wrapping_sub(1) as usize) / self.mss
    }

    /// Ledger entry whose payload range contains the byte `ack − 1`.
    fn covering_entry(&self, ack: u32) -> Option<&LedgerEntry> {
        let last_byte = ack.wrapping_sub(self.isn).wrapping_sub(2) as usize;
        self.entries.get(last_byte / self.mss)?.as_ref()
    }
}

/// `true` when sequence number `a` ≤ `b` in wrap-around space.
///
/// Correct while the two values are less than `u32::MAX / 2` apart, which a
/// bounded window guarantees.
#[inline]
fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) <= u32::MAX / 2
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
