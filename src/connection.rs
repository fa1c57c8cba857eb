//! Shared connection plumbing: the error taxonomy and the filtering-receive
//! primitive used by both roles.
//!
//! Every blocking wait in the protocol — handshake steps, teardown steps, the
//! initiator's ACK wait — is the same shape: receive datagrams until one
//! satisfies a predicate, silently discarding everything else (malformed
//! datagrams, stray duplicates, reordering noise).  [`receive_until`] and
//! [`receive_until_timeout`] express that shape once; the engines supply the
//! predicate.
//!
//! Discarded segments are never queued or replayed.  A datagram that fails to
//! decode is treated exactly like a non-matching segment: dropped, loop
//! continues.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use crate::segment::Segment;
use crate::socket::{Received, Socket, SocketError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by the role engines.
///
/// Only genuinely fatal conditions appear here.  Malformed segments,
/// checksum mismatches, timeouts, and duplicate ACKs are all recovered
/// internally and never become a `ConnError`.
#[derive(Debug)]
pub enum ConnError {
    /// Transport setup or send/receive failed at the socket layer.
    Socket(SocketError),
    /// File or log I/O failed.
    Io(std::io::Error),
    /// An operation was attempted in a state that does not permit it.
    BadState,
}

impl std::fmt::Display for ConnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Socket(e) => write!(f, "transport failure: {e}"),
            Self::Io(e) => write!(f, "file I/O failure: {e}"),
            Self::BadState => write!(f, "operation not valid in current connection state"),
        }
    }
}

impl std::error::Error for ConnError {}

impl From<SocketError> for ConnError {
    fn from(e: SocketError) -> Self {
        Self::Socket(e)
    }
}

impl From<std::io::Error> for ConnError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Filtering receive
// ---------------------------------------------------------------------------

/// Receive until a segment satisfying `pred` arrives.
///
/// Non-matching segments and undecodable datagrams are silently discarded.
/// Blocks indefinitely; only socket I/O errors end the wait early.
pub async fn receive_until<F>(
    socket: &Socket,
    mut pred: F,
) -> Result<(Segment, SocketAddr), ConnError>
where
    F: FnMut(&Segment, SocketAddr) -> bool,
{
    loop {
        match socket.recv_from().await {
            Ok((segment, addr)) => {
                if pred(&segment, addr) {
                    return Ok((segment, addr));
                }
                log::debug!(
                    "discarding unexpected segment flags={} seq={} ack={}",
                    segment.flag_summary(),
                    segment.seq,
                    segment.ack
                );
            }
            Err(SocketError::Codec(e)) => {
                log::debug!("discarding undecodable datagram: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Receive until a segment satisfying `pred` arrives or `timeout` elapses.
///
/// The deadline covers the whole wait: discarded segments do not extend it.
pub async fn receive_until_timeout<F>(
    socket: &Socket,
    timeout: Duration,
    mut pred: F,
) -> Result<Received, ConnError>
where
    F: FnMut(&Segment, SocketAddr) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(Received::TimedOut);
        }
        match socket
            .recv_from_timeout(remaining)
            .await
            .map_err(ConnErrorSource::from)
        {
            Ok(Received::Segment(segment, addr)) => {
                if pred(&segment, addr) {
                    return Ok(Received::Segment(segment, addr));
                }
                log::debug!(
                    "discarding unexpected segment flags={} seq={} ack={}",
                    segment.flag_summary(),
                    segment.seq,
                    segment.ack
                );
            }
            Ok(Received::TimedOut) => return Ok(Received::TimedOut),
            Err(ConnErrorSource::Codec(e)) => {
                log::debug!("discarding undecodable datagram: {e}");
            }
            Err(ConnErrorSource::Other(e)) => return Err(e.into()),
        }
    }
}

/// Internal split of [`SocketError`] so the timeout loop can keep going on
/// decode failures without consuming the match arm for fatal errors.
enum ConnErrorSource {
    Codec(crate::segment::SegmentError),
    Other(SocketError),
}

impl From<SocketError> for ConnErrorSource {
    fn from(e: SocketError) -> Self {
        match e {
            SocketError::Codec(c) => Self::Codec(c),
            other => Self::Other(other),
        }
    }
}
