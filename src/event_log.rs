//! Plain-text protocol event log.
//!
//! Each role records every interesting segment event to a line-oriented log
//! with fixed-width columns:
//!
//! ```text
//! evnt   time   flag          seq num  bytes          ack num
//!
//! snd       0      S             4452      0                0
//! rcv      12     SA                0      0             4453
//! ```
//!
//! Columns: event kind, elapsed milliseconds since the engine started,
//! single-letter flag summary, sequence number, payload byte count,
//! acknowledgement number.
//!
//! The writer is shared between the main protocol loop and any in-flight
//! delayed-send tasks, so it lives behind a mutex.  The lock is never held
//! across an await point.

use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;

use crate::segment::Segment;

/// The kind of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Segment handed to the network (includes retransmissions).
    Snd,
    /// Segment received from the network.
    Rcv,
    /// Segment discarded by the impairment simulator.
    Drop,
    /// Second copy of a duplicated segment.
    Dup,
    /// Segment sent with a corrupted payload byte.
    Corr,
    /// Previously withheld segment released out of order.
    Rord,
    /// Delayed segment sent after its scheduled wait.
    Dely,
}

impl EventKind {
    fn label(self) -> &'static str {
        match self {
            EventKind::Snd => "snd",
            EventKind::Rcv => "rcv",
            EventKind::Drop => "drop",
            EventKind::Dup => "dup",
            EventKind::Corr => "corr",
            EventKind::Rord => "rord",
            EventKind::Dely => "dely",
        }
    }
}

/// A shared, fixed-width event log.
pub struct EventLog {
    start: Instant,
    out: Mutex<Box<dyn Write + Send>>,
}

impl EventLog {
    /// Create a log writing to the file at `path`, with the column header row.
    pub fn create(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Self::from_writer(Box::new(std::io::BufWriter::new(file)))
    }

    /// Create a log over an arbitrary writer (tests use an in-memory buffer).
    pub fn from_writer(mut out: Box<dyn Write + Send>) -> std::io::Result<Self> {
        writeln!(
            out,
            "{:<4}{:>7}{:>7}{:>17}{:>7}{:>17}\n",
            "evnt", "time", "flag", "seq num", "bytes", "ack num"
        )?;
        Ok(Self {
            start: Instant::now(),
            out: Mutex::new(out),
        })
    }

    /// Append one event row describing `segment`.
    ///
    /// Write failures are reported to the diagnostic logger and otherwise
    /// ignored: a lost log line must not take down the transfer.
    pub fn record(&self, kind: EventKind, segment: &Segment) {
        let elapsed_ms = self.start.elapsed().as_millis();
        let mut out = self.out.lock().expect("event log lock poisoned");
        let result = writeln!(
            out,
            "{:<4}{:>7}{:>7}{:>17}{:>7}{:>17}",
            kind.label(),
            elapsed_ms,
            segment.flag_summary(),
            segment.seq,
            segment.payload.len(),
            segment.ack
        );
        if let Err(e) = result {
            log::warn!("event log write failed: {e}");
        }
    }

    /// Flush buffered rows to the underlying writer.
    pub fn flush(&self) -> std::io::Result<()> {
        self.out.lock().expect("event log lock poisoned").flush()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::flags;
    use std::sync::Arc;

    /// `Write` adapter capturing output for inspection after the log is used.
    #[derive(Clone)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_log() -> (EventLog, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let log = EventLog::from_writer(Box::new(Capture(buf.clone()))).unwrap();
        (log, buf)
    }

    #[test]
    fn header_row_then_blank_line() {
        let (_log, buf) = capture_log();
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("evnt"));
        assert!(header.ends_with("ack num"));
        assert_eq!(lines.next().unwrap(), "");
    }

    #[test]
    fn rows_have_fixed_column_widths() {
        let (log, buf) = capture_log();
        log.record(EventKind::Snd, &Segment::control(flags::SYN, 4452, 0));
        log.record(
            EventKind::Rcv,
            &Segment::control(flags::SYN | flags::ACK, 0, 4453),
        );

        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        let rows: Vec<&str> = text.lines().skip(2).collect();
        assert_eq!(rows.len(), 2);
        // evnt(4) + time(7) + flag(7) + seq(17) + bytes(7) + ack(17) = 59
        for row in &rows {
            assert_eq!(row.len(), 59, "bad width in row: {row:?}");
        }
        assert!(rows[0].starts_with("snd "));
        assert_eq!(&rows[0][11..18], "      S");
        assert!(rows[1].starts_with("rcv "));
        assert_eq!(&rows[1][11..18], "     SA");
    }

    #[test]
    fn data_row_reports_payload_bytes() {
        let (log, buf) = capture_log();
        log.record(EventKind::Snd, &Segment::data(100, 1, vec![0u8; 512]));

        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        let row = text.lines().nth(2).unwrap();
        // flag column shows D for data, bytes column shows the payload length
        assert_eq!(&row[11..18], "      D");
        assert_eq!(&row[35..42], "    512");
    }

    #[test]
    fn all_event_kinds_have_distinct_labels() {
        let kinds = [
            EventKind::Snd,
            EventKind::Rcv,
            EventKind::Drop,
            EventKind::Dup,
            EventKind::Corr,
            EventKind::Rord,
            EventKind::Dely,
        ];
        let labels: std::collections::HashSet<&str> =
            kinds.iter().map(|k| k.label()).collect();
        assert_eq!(labels.len(), kinds.len());
    }
}
