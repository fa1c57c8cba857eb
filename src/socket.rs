//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::segment::Segment`] instead of raw bytes.  All protocol logic
//! lives elsewhere; this module owns only datagram I/O.
//!
//! Timeout expiry is a *value*, not an error: [`Socket::recv_from_timeout`]
//! returns [`Received::TimedOut`], which the initiator's retransmission loop
//! consumes directly.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::segment::{Segment, SegmentError};

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    Io(std::io::Error),
    /// The received datagram could not be decoded as a valid segment.
    Codec(SegmentError),
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "socket I/O error: {e}"),
            Self::Codec(e) => write!(f, "segment decode error: {e}"),
        }
    }
}

impl std::error::Error for SocketError {}

impl From<std::io::Error> for SocketError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<SegmentError> for SocketError {
    fn from(e: SegmentError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Received
// ---------------------------------------------------------------------------

/// Outcome of a receive with a deadline.
#[derive(Debug)]
pub enum Received {
    /// A datagram arrived and decoded into a segment.
    Segment(Segment, SocketAddr),
    /// The deadline expired with nothing to deliver.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, segment-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared (behind an `Arc`)
/// between the main protocol loop and delayed-send tasks.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `segment` and send it as a single UDP datagram to `dest`.
    pub async fn send_to(&self, segment: &Segment, dest: SocketAddr) -> Result<(), SocketError> {
        self.send_raw(&segment.encode(), dest).await
    }

    /// Send an already-encoded datagram to `dest`.
    ///
    /// The impairment simulator works on raw bytes (it must be able to flip
    /// payload bits without re-checksumming), so this path skips encoding.
    pub async fn send_raw(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram and decode it into a [`Segment`].
    ///
    /// Returns `(segment, sender_address)`.  Datagrams that fail to decode
    /// are returned as `Err` — the caller decides whether to retry.
    pub async fn recv_from(&self) -> Result<(Segment, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let segment = Segment::decode(&buf[..n])?;
        Ok((segment, addr))
    }

    /// Receive with a deadline.
    ///
    /// Returns [`Received::TimedOut`] when `timeout` elapses first; the
    /// initiator treats that as its retransmission trigger.
    pub async fn recv_from_timeout(&self, timeout: Duration) -> Result<Received, SocketError> {
        match tokio::time::timeout(timeout, self.recv_from()).await {
            Ok(Ok((segment, addr))) => Ok(Received::Segment(segment, addr)),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(Received::TimedOut),
        }
    }
}
