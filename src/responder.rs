//! Responder (server) role engine.
//!
//! The [`Responder`] owns the receiving side of one connection: the listen
//! socket, the reassembly buffer, and the output path.  Usage:
//!
//! ```ignore
//! let mut resp = Responder::bind(config).await?;
//! resp.accept().await?;            // passive handshake
//! let bytes = resp.receive_file().await?;
//! ```
//!
//! `bind` claims the listen port (exposed via [`Responder::local_addr`] so
//! tests can bind port 0); `accept` completes the passive handshake, learning
//! the peer's address and ISN from its SYN; `receive_file` runs the
//! reassembly loop until the peer's FIN, drives the responder half of the
//! teardown, and writes the reassembled bytes to the output file.
//!
//! Two behaviors are deliberate corrections over naive implementations of
//! this protocol family: every data segment's payload checksum is verified
//! (mismatches are dropped without an ACK, forcing a sender-side
//! retransmission), and the cumulative ACK never advances past a reassembly
//! gap.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::connection::{receive_until, ConnError};
use crate::event_log::{EventKind, EventLog};
use crate::reassembly::ReassemblyBuffer;
use crate::segment::{flags, Segment};
use crate::socket::Socket;
use crate::state::ConnectionState;

/// The responder's ISN is fixed; its side of the stream carries no data.
const RESPONDER_ISN: u32 = 0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything the responder needs to serve one transfer.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Local listen address (port 0 lets the OS pick).
    pub listen: SocketAddr,
    /// Where to write the reassembled file.
    pub output: PathBuf,
    /// Where to write the protocol event log.
    pub log_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// The receiving side of one connection.
pub struct Responder {
    state: ConnectionState,
    socket: Socket,
    /// Learned from the SYN during [`Responder::accept`].
    peer: Option<SocketAddr>,
    peer_isn: u32,
    current_seq: u32,
    current_ack: u32,
    /// Built lazily: the MSS is learned from the first data datagram.
    buffer: Option<ReassemblyBuffer>,
    output: PathBuf,
    log: EventLog,
}

impl Responder {
    /// Bind the listen socket and open the log; no traffic yet.
    pub async fn bind(config: ResponderConfig) -> Result<Self, ConnError> {
        let socket = Socket::bind(config.listen).await?;
        let log = EventLog::create(&config.log_path)?;
        log::debug!("[responder] listening on {}", socket.local_addr);
        Ok(Self {
            state: ConnectionState::Listen,
            socket,
            peer: None,
            peer_isn: 0,
            current_seq: RESPONDER_ISN.wrapping_add(1),
            current_ack: 0,
            buffer: None,
            output: config.output,
            log,
        })
    }

    /// Address the listen socket actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Current FSM state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The initiator's ISN as recorded from its SYN.
    pub fn peer_isn(&self) -> u32 {
        self.peer_isn
    }

    /// Receive cursor (cumulative ACK the next outbound segment will carry).
    pub fn current_ack(&self) -> u32 {
        self.current_ack
    }

    /// Send cursor.
    pub fn current_seq(&self) -> u32 {
        self.current_seq
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Complete the passive handshake: wait for a SYN, reply SYN-ACK, wait
    /// for the handshake-completing ACK.
    pub async fn accept(&mut self) -> Result<(), ConnError> {
        if self.state != ConnectionState::Listen {
            return Err(ConnError::BadState);
        }

        // Block for a SYN; it tells us who the peer is and their ISN.
        let (syn, peer) = receive_until(&self.socket, |s, _| s.is_syn()).await?;
        self.log.record(EventKind::Rcv, &syn);
        self.peer = Some(peer);
        self.peer_isn = syn.seq;
        self.state = ConnectionState::SynReceived;
        log::debug!("[responder] ← SYN from {peer} isn={}", self.peer_isn);

        let syn_ack = Segment::control(
            flags::SYN | flags::ACK,
            RESPONDER_ISN,
            self.peer_isn.wrapping_add(1),
        );
        self.socket.send_to(&syn_ack, peer).await?;
        self.log.record(EventKind::Snd, &syn_ack);

        // Block for the handshake-completing ACK.
        let expected = RESPONDER_ISN.wrapping_add(1);
        let (ack, _) = receive_until(&self.socket, |s, addr| {
            addr == peer && s.is_ack() && s.ack == expected
        })
        .await?;
        self.log.record(EventKind::Rcv, &ack);

        self.current_seq = expected;
        self.current_ack = self.peer_isn.wrapping_add(1);
        self.state = ConnectionState::Established;
        log::debug!("[responder] established");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reassembly loop
    // -----------------------------------------------------------------------

    /// Receive until the peer's FIN, drive the teardown, and write the
    /// output file.  Returns the number of bytes written.
    pub async fn receive_file(&mut self) -> Result<u64, ConnError> {
        if self.state != ConnectionState::Established {
            return Err(ConnError::BadState);
        }
        let peer = self.peer.ok_or(ConnError::BadState)?;

        loop {
            let (segment, _) = receive_until(&self.socket, |_, addr| addr == peer).await?;
            self.log.record(EventKind::Rcv, &segment);

            if segment.is_fin() {
                self.teardown(peer).await?;
                break;
            }
            if segment.payload.is_empty() {
                continue; // stray control segment
            }

            // Corrupted payloads are dropped without an ACK; the missing
            // acknowledgement is what makes the sender retransmit.
            if !segment.verify_checksum() {
                log::debug!(
                    "[responder] checksum mismatch at seq={} — dropped",
                    segment.seq
                );
                continue;
            }

            let peer_isn = self.peer_isn;
            let buffer = self.buffer.get_or_insert_with(|| {
                let mss = segment.payload.len();
                log::debug!("[responder] learned MSS = {mss}");
                ReassemblyBuffer::new(peer_isn, mss)
            });

            if buffer.insert(segment.seq, &segment.payload) {
                self.current_ack = buffer.ack_number();
            }

            let ack = Segment::control(flags::ACK, self.current_seq, self.current_ack);
            self.socket.send_to(&ack, peer).await?;
            self.log.record(EventKind::Snd, &ack);
            log::debug!(
                "[responder] ← DATA seq={} len={}; → ACK {}",
                segment.seq,
                segment.payload.len(),
                self.current_ack
            );
        }

        // Flush the contiguous prefix in index order to the output sink.
        let data = self
            .buffer
            .as_ref()
            .map(ReassemblyBuffer::assemble)
            .unwrap_or_default();
        tokio::fs::write(&self.output, &data).await?;
        self.log.flush()?;
        log::debug!("[responder] wrote {} bytes to {:?}", data.len(), self.output);
        Ok(data.len() as u64)
    }

    // -----------------------------------------------------------------------
    // Teardown (responder half)
    // -----------------------------------------------------------------------

    /// ACK the peer's FIN, send our own FIN, and wait for the final ACK.
    async fn teardown(&mut self, peer: SocketAddr) -> Result<(), ConnError> {
        self.state = ConnectionState::CloseWait;

        // The FIN consumes one sequence number.
        self.current_ack = self.current_ack.wrapping_add(1);
        let ack = Segment::control(flags::ACK, self.current_seq, self.current_ack);
        self.socket.send_to(&ack, peer).await?;
        self.log.record(EventKind::Snd, &ack);

        let fin = Segment::control(flags::FIN, self.current_seq, self.current_ack);
        self.socket.send_to(&fin, peer).await?;
        self.log.record(EventKind::Snd, &fin);
        log::debug!("[responder] → ACK, → FIN seq={}", fin.seq);

        let expected = self.current_seq.wrapping_add(1);
        let (final_ack, _) = receive_until(&self.socket, |s, addr| {
            addr == peer && s.is_ack() && s.ack == expected
        })
        .await?;
        self.log.record(EventKind::Rcv, &final_ack);
        self.state = ConnectionState::Closed;
        log::debug!("[responder] teardown complete");
        Ok(())
    }
}

/// One-shot convenience: bind, accept, receive, write.
pub async fn run(config: ResponderConfig) -> Result<u64, ConnError> {
    let mut engine = Responder::bind(config).await?;
    engine.accept().await?;
    engine.receive_file().await
}
