//! Initiator (client) role engine.
//!
//! The [`Initiator`] owns every piece of connection state for the sending
//! side: the socket, the file being transferred, the send window and ledger,
//! the RTT estimator, and the impairment pipeline.  Usage:
//!
//! ```ignore
//! let mut init = Initiator::connect(config).await?;
//! init.send_file().await?;
//! let stats = init.close().await?;
//! ```
//!
//! `connect` performs the three-way handshake, `send_file` runs the windowed
//! transfer loop, and `close` drives the four-segment teardown and releases
//! everything (delayed-send tasks included).  Dropping the engine without a
//! clean close still cancels outstanding tasks and flushes the log.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::AsyncReadExt;

use crate::connection::{receive_until, receive_until_timeout, ConnError};
use crate::event_log::{EventKind, EventLog};
use crate::pld::{Pld, PldConfig};
use crate::rtt::RttEstimator;
use crate::segment::{flags, Segment};
use crate::send_window::{AckOutcome, SendWindow};
use crate::socket::{Received, Socket};
use crate::state::ConnectionState;

/// Upper bound (inclusive) of the random ISN draw.
const MAX_ISN: u32 = 100_000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything the initiator needs to run one transfer.
#[derive(Debug, Clone)]
pub struct InitiatorConfig {
    /// Responder address.
    pub peer: SocketAddr,
    /// File to transfer.
    pub file: PathBuf,
    /// Maximum window size in bytes.
    pub mws: usize,
    /// Maximum segment size in bytes.
    pub mss: usize,
    /// Deviation gain for the retransmission timeout.
    pub gamma: u32,
    /// Impairment pipeline parameters.
    pub pld: PldConfig,
    /// Seed for the shared PRNG (ISN draw + impairment cascade).
    pub seed: u64,
    /// Where to write the protocol event log.
    pub log_path: PathBuf,
}

/// End-of-run summary.
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    /// Bytes of file data transferred.
    pub bytes_sent: u64,
    /// Number of data segments the file was split into.
    pub segments: usize,
    /// Retransmissions (timeout and fast retransmit combined).
    pub retransmits: u64,
    /// Duplicate ACKs observed.
    pub duplicate_acks: u64,
}

// ---------------------------------------------------------------------------
// Initiator
// ---------------------------------------------------------------------------

/// The sending side of one connection.
pub struct Initiator {
    state: ConnectionState,
    socket: Arc<Socket>,
    peer: SocketAddr,
    isn: u32,
    current_seq: u32,
    current_ack: u32,
    file: tokio::fs::File,
    file_len: u64,
    data_sent: u64,
    mss: usize,
    window: SendWindow,
    rtt: RttEstimator,
    pld: Arc<Pld>,
    log: Arc<EventLog>,
}

impl Initiator {
    /// Bootstrap the engine and perform the three-way handshake.
    ///
    /// Draws the ISN from the seeded generator before handing it to the
    /// impairment pipeline, so one seed determines the whole run.
    pub async fn connect(config: InitiatorConfig) -> Result<Self, ConnError> {
        let file = tokio::fs::File::open(&config.file).await?;
        let file_len = file.metadata().await?.len();
        let socket = Arc::new(Socket::bind("0.0.0.0:0".parse().unwrap()).await?);
        let log = Arc::new(EventLog::create(&config.log_path)?);

        let mut rng = StdRng::seed_from_u64(config.seed);
        let isn = rng.gen_range(1..=MAX_ISN);
        let pld = Arc::new(Pld::new(
            config.pld,
            Arc::clone(&socket),
            config.peer,
            Arc::clone(&log),
            rng,
        ));

        let mut engine = Self {
            state: ConnectionState::Closed,
            socket,
            peer: config.peer,
            isn,
            current_seq: isn,
            current_ack: 0,
            file,
            file_len,
            data_sent: 0,
            mss: config.mss,
            window: SendWindow::new(isn, config.mss, config.mws, file_len),
            rtt: RttEstimator::new(config.gamma),
            pld,
            log,
        };
        engine.handshake().await?;
        Ok(engine)
    }

    /// Current FSM state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The randomly drawn initial sequence number.
    pub fn isn(&self) -> u32 {
        self.isn
    }

    /// Send cursor (next data byte's sequence number).
    pub fn current_seq(&self) -> u32 {
        self.current_seq
    }

    /// Receive cursor (next expected byte from the peer).
    pub fn current_ack(&self) -> u32 {
        self.current_ack
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    async fn handshake(&mut self) -> Result<(), ConnError> {
        let syn = Segment::control(flags::SYN, self.isn, 0);
        self.socket.send_to(&syn, self.peer).await?;
        self.log.record(EventKind::Snd, &syn);
        self.state = ConnectionState::SynSent;
        log::debug!("[initiator] → SYN seq={}", self.isn);

        // Block for SYN+ACK acknowledging our ISN; everything else is noise.
        let expected = self.isn.wrapping_add(1);
        let peer = self.peer;
        let (syn_ack, _) = receive_until(&self.socket, |s, addr| {
            addr == peer && s.is_syn() && s.is_ack() && s.ack == expected
        })
        .await?;
        self.log.record(EventKind::Rcv, &syn_ack);
        let peer_isn = syn_ack.seq;
        log::debug!("[initiator] ← SYN-ACK peer_isn={peer_isn}");

        let ack = Segment::control(flags::ACK, expected, peer_isn.wrapping_add(1));
        self.socket.send_to(&ack, self.peer).await?;
        self.log.record(EventKind::Snd, &ack);

        self.current_seq = expected;
        self.current_ack = peer_isn.wrapping_add(1);
        self.state = ConnectionState::Established;
        log::debug!("[initiator] established, send cursor {}", self.current_seq);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Run the windowed transfer until every file byte is acknowledged.
    ///
    /// Each iteration takes exactly one of two branches: send a new segment
    /// while file data remains and the window has room, otherwise block for
    /// an ACK with the adaptive timeout and retransmit on expiry.
    pub async fn send_file(&mut self) -> Result<(), ConnError> {
        if self.state != ConnectionState::Established {
            return Err(ConnError::BadState);
        }

        loop {
            if self.data_sent < self.file_len && self.window.can_send() {
                self.send_next_segment().await?;
            } else {
                if self.window.all_acked() {
                    break; // everything sent and confirmed
                }
                self.await_ack().await?;
            }
        }

        log::debug!(
            "[initiator] transfer complete: {} bytes, {} retransmits, {} dup ACKs",
            self.data_sent,
            self.window.total_retransmits,
            self.window.total_dup_acks
        );
        Ok(())
    }

    /// Send branch: frame up to MSS bytes and hand them to the pipeline.
    async fn send_next_segment(&mut self) -> Result<(), ConnError> {
        let remaining = (self.file_len - self.data_sent) as usize;
        let mut payload = vec![0u8; self.mss.min(remaining)];
        self.file.read_exact(&mut payload).await?;

        let segment = Segment::data(self.current_seq, self.current_ack, payload);
        let payload_len = segment.payload.len();
        let datagram = segment.encode();

        self.window
            .record_sent(datagram.clone(), payload_len, Instant::now());
        self.pld.forward(datagram).await?;

        self.current_seq = self.current_seq.wrapping_add(payload_len as u32);
        self.data_sent += payload_len as u64;
        log::debug!(
            "[initiator] → DATA seq={} len={} unacked={}",
            segment.seq,
            payload_len,
            self.window.unacked_bytes()
        );
        Ok(())
    }

    /// Wait branch: one blocking receive under the adaptive timeout.
    async fn await_ack(&mut self) -> Result<(), ConnError> {
        let timeout = self.rtt.timeout();
        let peer = self.peer;
        let received =
            receive_until_timeout(&self.socket, timeout, |s, addr| addr == peer && s.is_ack())
                .await?;

        match received {
            Received::Segment(ack_seg, _) => {
                let now = Instant::now();
                self.log.record(EventKind::Rcv, &ack_seg);
                match self.window.on_ack(ack_seg.ack, now) {
                    AckOutcome::Progress { rtt_sample } => {
                        if let Some(sample) = rtt_sample {
                            self.rtt.sample(sample);
                            log::debug!(
                                "[initiator] ← ACK {} rtt={:?} timeout={:?}",
                                ack_seg.ack,
                                sample,
                                self.rtt.timeout()
                            );
                        }
                    }
                    AckOutcome::Duplicate { fast_retransmit } => {
                        if fast_retransmit {
                            log::debug!("[initiator] 3 duplicate ACKs — fast retransmit");
                            self.retransmit_oldest().await?;
                        }
                    }
                    AckOutcome::Stale => {}
                }
            }
            Received::TimedOut => {
                log::debug!("[initiator] timeout after {timeout:?} — retransmitting");
                self.retransmit_oldest().await?;
            }
        }
        Ok(())
    }

    /// Resend the oldest unacknowledged segment.
    ///
    /// Retransmissions go straight to the send primitive — they still count
    /// as forwardings for the reorder hold but never re-enter the cascade.
    async fn retransmit_oldest(&mut self) -> Result<(), ConnError> {
        if let Some(datagram) = self.window.retransmit_oldest() {
            self.pld.transmit(&datagram, EventKind::Snd).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Four-segment teardown, then resource release.
    pub async fn close(&mut self) -> Result<TransferStats, ConnError> {
        if self.state == ConnectionState::Established {
            let fin = Segment::control(flags::FIN, self.current_seq, self.current_ack);
            self.socket.send_to(&fin, self.peer).await?;
            self.log.record(EventKind::Snd, &fin);
            self.state = ConnectionState::FinWait;
            log::debug!("[initiator] → FIN seq={}", fin.seq);

            let expected = self.current_seq.wrapping_add(1);
            let peer = self.peer;
            let (fin_ack, _) = receive_until(&self.socket, |s, addr| {
                addr == peer && s.is_ack() && s.ack == expected
            })
            .await?;
            self.log.record(EventKind::Rcv, &fin_ack);
            self.current_seq = expected;

            let (peer_fin, _) =
                receive_until(&self.socket, |s, addr| addr == peer && s.is_fin()).await?;
            self.log.record(EventKind::Rcv, &peer_fin);

            let final_ack =
                Segment::control(flags::ACK, self.current_seq, peer_fin.seq.wrapping_add(1));
            self.socket.send_to(&final_ack, self.peer).await?;
            self.log.record(EventKind::Snd, &final_ack);
            self.state = ConnectionState::Closed;
            log::debug!("[initiator] teardown complete");
        }

        self.pld.shutdown();
        self.log.flush()?;
        Ok(TransferStats {
            bytes_sent: self.data_sent,
            segments: self.file_len.div_ceil(self.mss as u64) as usize,
            retransmits: self.window.total_retransmits,
            duplicate_acks: self.window.total_dup_acks,
        })
    }
}

impl Drop for Initiator {
    /// Last-resort release for early exits: cancel delayed sends and flush
    /// whatever the log buffered.  Harmless after a clean [`Initiator::close`].
    fn drop(&mut self) {
        self.pld.shutdown();
        let _ = self.log.flush();
    }
}

/// One-shot convenience: connect, transfer, close.
pub async fn run(config: InitiatorConfig) -> Result<TransferStats, ConnError> {
    let mut engine = Initiator::connect(config).await?;
    engine.send_file().await?;
    engine.close().await
}
