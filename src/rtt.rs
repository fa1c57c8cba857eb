//! Adaptive retransmission-timeout estimation.
//!
//! The initiator recomputes its receive timeout from smoothed round-trip
//! statistics (Jacobson's algorithm with a configurable deviation gain):
//!
//! ```text
//! estimatedRTT = 0.875 · estimatedRTT + 0.125 · sampleRTT
//! devRTT       = 0.75  · devRTT       + 0.25  · |sampleRTT − estimatedRTT|
//! timeout      = estimatedRTT + gamma · devRTT
//! ```
//!
//! The deviation update uses the freshly updated estimate.  Before the first
//! sample the estimator starts from 500 ms / 250 ms.  Samples are only ever
//! fed from segments transmitted exactly once (Karn's rule); that filtering
//! happens in [`crate::send_window`], not here.

use std::time::Duration;

/// Smoothed RTT before any sample, in milliseconds.
const INITIAL_ESTIMATED_RTT_MS: f64 = 500.0;
/// RTT deviation before any sample, in milliseconds.
const INITIAL_DEV_RTT_MS: f64 = 250.0;

const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

/// Adaptive timeout state for one connection.
#[derive(Debug)]
pub struct RttEstimator {
    estimated_rtt_ms: f64,
    dev_rtt_ms: f64,
    gamma: f64,
}

impl RttEstimator {
    /// Create an estimator with deviation gain `gamma`.
    pub fn new(gamma: u32) -> Self {
        Self {
            estimated_rtt_ms: INITIAL_ESTIMATED_RTT_MS,
            dev_rtt_ms: INITIAL_DEV_RTT_MS,
            gamma: f64::from(gamma),
        }
    }

    /// Fold one round-trip sample into the smoothed statistics.
    pub fn sample(&mut self, rtt: Duration) {
        let sample_ms = rtt.as_secs_f64() * 1000.0;
        self.estimated_rtt_ms = (1.0 - ALPHA) * self.estimated_rtt_ms + ALPHA * sample_ms;
        self.dev_rtt_ms =
            (1.0 - BETA) * self.dev_rtt_ms + BETA * (sample_ms - self.estimated_rtt_ms).abs();
    }

    /// Current retransmission timeout: `estimatedRTT + gamma · devRTT`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64((self.estimated_rtt_ms + self.gamma * self.dev_rtt_ms) / 1000.0)
    }

    /// Smoothed RTT estimate in milliseconds (for diagnostics).
    pub fn estimated_rtt_ms(&self) -> f64 {
        self.estimated_rtt_ms
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
