//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a connection can occupy across both roles.
//! Transitions are driven by the role engines ([`crate::initiator`],
//! [`crate::responder`]); keeping the types separate makes it easy to add
//! guard logic or tracing without touching engine plumbing.
//!
//! ```text
//!  Initiator:  CLOSED ──SYN──▶ SYN_SENT ──SYN-ACK/ACK──▶ ESTABLISHED
//!                 ▲                                           │
//!                 └────── final ACK ◀── FIN_WAIT ◀───FIN──────┘
//!
//!  Responder:  CLOSED ──▶ LISTEN ──SYN──▶ SYN_RCVD ──ACK──▶ ESTABLISHED
//!                 ▲                                            │
//!                 └────── final ACK ◀── CLOSE_WAIT ◀──FIN──────┘
//! ```
//!
//! Teardown is strictly initiator-driven, so the simultaneous-close states of
//! full TCP (CLOSING, TIME_WAIT, ...) never occur here.

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection exists; initial and final state for both roles.
    Closed,
    /// Responder is bound and waiting for a SYN.
    Listen,
    /// Initiator sent SYN; waiting for SYN-ACK.
    SynSent,
    /// Responder saw a SYN and replied SYN-ACK; waiting for the final ACK.
    SynReceived,
    /// Handshake complete; data transfer in progress.
    Established,
    /// Initiator sent FIN; draining the four-segment teardown.
    FinWait,
    /// Responder saw the initiator's FIN; sending its own FIN and waiting
    /// for the last ACK.
    CloseWait,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Closed
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
