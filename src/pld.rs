//! Link impairment simulator (the "PLD module").
//!
//! Every outgoing data datagram is handed here instead of to the socket.
//! The simulator draws from a seeded PRNG and routes each datagram down a
//! probabilistic cascade — at most one outcome applies:
//!
//! | Stage      | Outcome                                                   |
//! |------------|-----------------------------------------------------------|
//! | drop       | discard silently (the peer never sees it)                 |
//! | duplicate  | send the unmodified datagram twice                        |
//! | corrupt    | flip all bits of the first payload byte, then send        |
//! | reorder    | withhold in a single hold slot until later traffic passes |
//! | delay      | send after a uniformly random wait on a spawned task      |
//! | (none)     | send immediately                                          |
//!
//! Draws are consumed lazily in the fixed stage order, so a given seed
//! reproduces an identical outcome sequence run after run.
//!
//! Every transmission — immediate, duplicate second-send, corrupt send,
//! delayed fire, and retransmission — funnels through one send primitive.
//! Each call to it counts one "forwarding" against a withheld datagram; when
//! the count reaches `max_order` the held datagram is flushed.  A new reorder
//! decision while the slot is occupied flushes the old occupant first.
//!
//! Delayed sends run on spawned tasks sharing the socket and event log; the
//! handles are tracked so [`Pld::shutdown`] can cancel whatever has not
//! fired.  Undelivered delayed sends are abandoned, not flushed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::event_log::{EventKind, EventLog};
use crate::segment::{Segment, HEADER_LEN};
use crate::socket::{Socket, SocketError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Impairment probabilities and bounds.
///
/// All probabilities are in `[0.0, 1.0]`.  The default is a transparent
/// pass-through (every probability zero).
#[derive(Debug, Clone)]
pub struct PldConfig {
    /// Probability that a datagram is dropped.
    pub p_drop: f64,
    /// Probability that a datagram not dropped is duplicated.
    pub p_duplicate: f64,
    /// Probability that a datagram not dropped/duplicated is corrupted.
    pub p_corrupt: f64,
    /// Probability that a datagram not dropped/duplicated/corrupted is
    /// withheld for reordering.
    pub p_order: f64,
    /// Forwardings after which a withheld datagram is flushed (0 disables
    /// the flush-by-count path).
    pub max_order: u32,
    /// Probability that a datagram that reaches the final stage is delayed.
    pub p_delay: f64,
    /// Upper bound (exclusive) of the uniformly random delay.
    pub max_delay: Duration,
}

impl Default for PldConfig {
    fn default() -> Self {
        Self {
            p_drop: 0.0,
            p_duplicate: 0.0,
            p_corrupt: 0.0,
            p_order: 0.0,
            max_order: 0,
            p_delay: 0.0,
            max_delay: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Fate
// ---------------------------------------------------------------------------

/// The outcome the cascade assigned to one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    /// No impairment; send immediately.
    Deliver,
    Drop,
    Duplicate,
    Corrupt,
    Reorder,
    /// Send after the contained wait.
    Delay(Duration),
}

/// Run the decision cascade for one datagram.
///
/// Draws are consumed lazily: a dropped datagram burns a single draw, a
/// delayed one burns six (five gates plus the delay amount).  Keeping the
/// order and laziness fixed is what makes a seed reproduce a run.
fn draw_fate(rng: &mut StdRng, config: &PldConfig) -> Fate {
    if rng.gen::<f64>() <= config.p_drop {
        return Fate::Drop;
    }
    if rng.gen::<f64>() <= config.p_duplicate {
        return Fate::Duplicate;
    }
    if rng.gen::<f64>() <= config.p_corrupt {
        return Fate::Corrupt;
    }
    if rng.gen::<f64>() <= config.p_order {
        return Fate::Reorder;
    }
    if rng.gen::<f64>() <= config.p_delay {
        let ms = rng.gen::<f64>() * config.max_delay.as_millis() as f64;
        return Fate::Delay(Duration::from_millis(ms as u64));
    }
    Fate::Deliver
}

// ---------------------------------------------------------------------------
// Pld
// ---------------------------------------------------------------------------

/// State shared between the main loop and delayed-send tasks.
#[derive(Debug)]
struct PldInner {
    rng: StdRng,
    /// The single held-for-reorder datagram.
    held: Option<Vec<u8>>,
    /// Sends since the current datagram was withheld.
    forwarding_count: u32,
}

/// The impairment pipeline for one connection.
///
/// Lives behind an `Arc` so delayed-send tasks can share it.
#[derive(Debug)]
pub struct Pld {
    config: PldConfig,
    socket: Arc<Socket>,
    peer: SocketAddr,
    log: Arc<EventLog>,
    inner: Mutex<PldInner>,
    /// Live delayed-send tasks, cancelled at shutdown.
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Pld {
    /// Build the pipeline.
    ///
    /// `rng` is the connection's shared seeded generator; the initiator draws
    /// its ISN from it first, then hands it over, so one seed determines the
    /// entire run.
    pub fn new(
        config: PldConfig,
        socket: Arc<Socket>,
        peer: SocketAddr,
        log: Arc<EventLog>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            socket,
            peer,
            log,
            inner: Mutex::new(PldInner {
                rng,
                held: None,
                forwarding_count: 0,
            }),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Decide and execute the fate of one outgoing datagram.
    pub async fn forward(self: &Arc<Self>, datagram: Vec<u8>) -> Result<(), SocketError> {
        let mut inner = self.inner.lock().await;
        let fate = draw_fate(&mut inner.rng, &self.config);
        match fate {
            Fate::Drop => {
                self.log_datagram(EventKind::Drop, &datagram);
                Ok(())
            }
            Fate::Duplicate => {
                self.transmit_locked(&mut inner, &datagram, EventKind::Snd)
                    .await?;
                self.transmit_locked(&mut inner, &datagram, EventKind::Dup)
                    .await
            }
            Fate::Corrupt => {
                let corrupted = corrupt_first_payload_byte(datagram);
                self.transmit_locked(&mut inner, &corrupted, EventKind::Corr)
                    .await
            }
            Fate::Reorder => {
                // An occupied hold slot is flushed before the newcomer moves in.
                if let Some(held) = inner.held.take() {
                    self.socket.send_raw(&held, self.peer).await?;
                    self.log_datagram(EventKind::Rord, &held);
                    inner.forwarding_count = 0;
                }
                inner.held = Some(datagram);
                Ok(())
            }
            Fate::Delay(wait) => {
                drop(inner);
                let pld = Arc::clone(self);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(wait).await;
                    if let Err(e) = pld.transmit(&datagram, EventKind::Dely).await {
                        log::warn!("delayed send failed: {e}");
                    }
                });
                self.tasks.lock().expect("task list lock poisoned").push(handle);
                Ok(())
            }
            Fate::Deliver => {
                self.transmit_locked(&mut inner, &datagram, EventKind::Snd)
                    .await
            }
        }
    }

    /// The shared send primitive.
    ///
    /// Used by delayed-send tasks when they fire, and by the initiator for
    /// retransmissions (which never re-enter the cascade).
    pub async fn transmit(&self, datagram: &[u8], kind: EventKind) -> Result<(), SocketError> {
        let mut inner = self.inner.lock().await;
        self.transmit_locked(&mut inner, datagram, kind).await
    }

    /// Send one datagram and account the forwarding against any held one.
    async fn transmit_locked(
        &self,
        inner: &mut PldInner,
        datagram: &[u8],
        kind: EventKind,
    ) -> Result<(), SocketError> {
        self.socket.send_raw(datagram, self.peer).await?;
        self.log_datagram(kind, datagram);

        if inner.held.is_some() {
            inner.forwarding_count += 1;
            if inner.forwarding_count == self.config.max_order && self.config.max_order != 0 {
                let held = inner.held.take().expect("hold slot emptied concurrently");
                self.socket.send_raw(&held, self.peer).await?;
                self.log_datagram(EventKind::Rord, &held);
                inner.forwarding_count = 0;
            }
        }
        Ok(())
    }

    /// Cancel every delayed send that has not yet fired.
    ///
    /// Called during teardown, before the socket and log are released.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().expect("task list lock poisoned");
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }

    fn log_datagram(&self, kind: EventKind, datagram: &[u8]) {
        if let Ok(segment) = Segment::decode(datagram) {
            self.log.record(kind, &segment);
        }
    }
}

/// Flip all bits of the first payload byte.
///
/// The header (including the stored checksum) is untouched, so the receiver's
/// verification is guaranteed to fail.  Payload-less datagrams pass through
/// unchanged.
fn corrupt_first_payload_byte(mut datagram: Vec<u8>) -> Vec<u8> {
    if datagram.len() > HEADER_LEN {
        datagram[HEADER_LEN] = !datagram[HEADER_LEN];
    }
    datagram
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
