//! `stp` — a simplified TCP-like reliable transport ("STP") over UDP, with a
//! built-in link impairment simulator.
//!
//! # Architecture
//!
//! ```text
//!  Initiator                                        Responder
//!  ┌────────────────────────┐                       ┌──────────────────────┐
//!  │ file ─▶ Segment codec  │      data segments    │ Segment codec        │
//!  │         │              │  ───────────────────▶ │   │ checksum verify  │
//!  │         ▼              │                       │   ▼                  │
//!  │   SendWindow / ledger  │                       │ ReassemblyBuffer ─▶ file
//!  │   RttEstimator         │      cumulative ACKs  │                      │
//!  │         │              │  ◀─────────────────── │                      │
//!  │         ▼              │                       └──────────────────────┘
//!  │   PLD (drop / dup /    │
//!  │   corrupt / reorder /  │
//!  │   delay)               │
//!  └───────────┬────────────┘
//!              │ raw UDP datagrams
//!       ┌──────▼──────┐
//!       │   Socket    │  (thin async wrapper around tokio UdpSocket)
//!       └─────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]     — wire format (serialise / deserialise / checksum)
//! - [`state`]       — finite-state-machine types for both roles
//! - [`socket`]      — async UDP socket abstraction
//! - [`connection`]  — error taxonomy + filtering-receive primitive
//! - [`send_window`] — send window, outstanding-segment ledger, duplicate ACKs
//! - [`reassembly`]  — out-of-order buffering with contiguous-watermark ACKing
//! - [`rtt`]         — adaptive retransmission-timeout estimation
//! - [`pld`]         — probabilistic link impairment pipeline
//! - [`event_log`]   — fixed-width plain-text protocol event log
//! - [`initiator`]   — client role: handshake, windowed transfer, teardown
//! - [`responder`]   — server role: handshake, reassembly, teardown

pub mod connection;
pub mod event_log;
pub mod initiator;
pub mod pld;
pub mod reassembly;
pub mod responder;
pub mod rtt;
pub mod segment;
pub mod send_window;
pub mod socket;
pub mod state;
