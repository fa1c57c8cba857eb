//! End-to-end transfer tests.
//!
//! Each test runs a complete session — handshake, windowed transfer,
//! teardown — between two in-process endpoints on loopback, with the
//! impairment pipeline configured per scenario, and asserts that the
//! responder reconstructs the input byte-for-byte.
//!
//! The clean scenario additionally checks the exact segment and ACK
//! accounting by parsing the initiator's event log.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stp::initiator::{self, InitiatorConfig, TransferStats};
use stp::pld::PldConfig;
use stp::responder::{Responder, ResponderConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn scratch_path(tag: &str) -> PathBuf {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("stp-transfer-{}-{id}-{tag}", std::process::id()))
}

/// A patterned (non-uniform) input so index mix-ups cannot cancel out.
fn patterned_input(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

struct Outcome {
    received: Vec<u8>,
    stats: TransferStats,
    sender_log: String,
}

/// Run one complete session over loopback and collect everything observable.
async fn run_session(
    input: &[u8],
    mws: usize,
    mss: usize,
    gamma: u32,
    pld: PldConfig,
    seed: u64,
) -> Outcome {
    let input_path = scratch_path("input");
    let output_path = scratch_path("output");
    let sender_log_path = scratch_path("sender-log");
    std::fs::write(&input_path, input).unwrap();

    let mut responder = Responder::bind(ResponderConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        output: output_path.clone(),
        log_path: scratch_path("receiver-log"),
    })
    .await
    .expect("bind responder");
    let peer: SocketAddr = responder.local_addr();

    let server = tokio::spawn(async move {
        responder.accept().await.expect("accept failed");
        responder.receive_file().await.expect("receive failed")
    });

    let stats = tokio::time::timeout(
        Duration::from_secs(120),
        initiator::run(InitiatorConfig {
            peer,
            file: input_path,
            mws,
            mss,
            gamma,
            pld,
            seed,
            log_path: sender_log_path.clone(),
        }),
    )
    .await
    .expect("initiator timed out")
    .expect("initiator failed");

    let written = tokio::time::timeout(Duration::from_secs(30), server)
        .await
        .expect("responder timed out")
        .expect("responder task panicked");

    let received = std::fs::read(&output_path).unwrap();
    assert_eq!(written, received.len() as u64);

    Outcome {
        received,
        stats,
        sender_log: std::fs::read_to_string(&sender_log_path).unwrap(),
    }
}

/// Parse the event log into `(event, flag, seq, bytes, ack)` tuples.
fn parse_log(log: &str) -> Vec<(String, String, u32, usize, u32)> {
    log.lines()
        .skip(2) // header row + blank line
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            assert_eq!(cols.len(), 6, "malformed log row: {line:?}");
            (
                cols[0].to_string(),
                cols[2].to_string(),
                cols[3].parse().unwrap(),
                cols[4].parse().unwrap(),
                cols[5].parse().unwrap(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Clean link: exact accounting
// ---------------------------------------------------------------------------

/// MWS 4096, MSS 1024, no impairments, 3500-byte file: exactly four data
/// segments (1024, 1024, 1024, 428), ACKs at ISN+1025 / +2049 / +3073 /
/// +3501, byte-identical output, then a clean teardown.
#[tokio::test]
async fn clean_transfer_has_exact_segment_and_ack_accounting() {
    let input = patterned_input(3500);
    let out = run_session(&input, 4096, 1024, 4, PldConfig::default(), 300).await;

    assert_eq!(out.received, input);
    assert_eq!(out.stats.bytes_sent, 3500);
    assert_eq!(out.stats.segments, 4);
    assert_eq!(out.stats.retransmits, 0);
    assert_eq!(out.stats.duplicate_acks, 0);

    let rows = parse_log(&out.sender_log);

    // The SYN row carries the ISN.
    let (event, flag, isn, _, _) = rows[0].clone();
    assert_eq!((event.as_str(), flag.as_str()), ("snd", "S"));

    // Exactly four data sends of the expected sizes and sequence numbers.
    let data_rows: Vec<_> = rows.iter().filter(|r| r.1 == "D").collect();
    assert_eq!(data_rows.len(), 4);
    let expected_sizes = [1024usize, 1024, 1024, 428];
    for (i, row) in data_rows.iter().enumerate() {
        assert_eq!(row.0, "snd");
        assert_eq!(row.2, isn + 1 + (i as u32 * 1024), "seq of segment {i}");
        assert_eq!(row.3, expected_sizes[i], "payload bytes of segment {i}");
    }

    // Cumulative ACKs arrive at the four data boundaries, then the
    // teardown's ACK-of-FIN one past the stream.
    let acks: Vec<u32> = rows
        .iter()
        .filter(|r| r.0 == "rcv" && r.1 == "A")
        .map(|r| r.4)
        .collect();
    assert_eq!(
        acks,
        vec![
            isn + 1025,
            isn + 2049,
            isn + 3073,
            isn + 3501,
            isn + 3502
        ]
    );

    // Two-segments-each-direction teardown: FIN out, ACK+FIN in, ACK out.
    assert!(rows.iter().any(|r| r.0 == "snd" && r.1 == "F"));
    assert!(rows.iter().any(|r| r.0 == "rcv" && r.1 == "F"));
    let last = rows.last().unwrap();
    assert_eq!((last.0.as_str(), last.1.as_str()), ("snd", "A"));
}

/// A transfer shorter than one MSS travels as a single short segment.
#[tokio::test]
async fn sub_mss_transfer() {
    let input = patterned_input(77);
    let out = run_session(&input, 4096, 1024, 4, PldConfig::default(), 9).await;
    assert_eq!(out.received, input);
    assert_eq!(out.stats.segments, 1);
}

/// A window smaller than the file forces the sender to stall on ACKs
/// mid-transfer; delivery must still be complete and in order.
#[tokio::test]
async fn window_smaller_than_file() {
    let input = patterned_input(16 * 512);
    let out = run_session(&input, 1024, 512, 4, PldConfig::default(), 11).await;
    assert_eq!(out.received, input);
    assert_eq!(out.stats.segments, 16);
}

// ---------------------------------------------------------------------------
// Impaired links: reliability under each fault
// ---------------------------------------------------------------------------

/// Heavy segment loss: every lost segment must be recovered by timeout or
/// fast retransmit until the file is complete.
#[tokio::test]
async fn transfer_survives_drops() {
    let input = patterned_input(12 * 512);
    let pld = PldConfig {
        p_drop: 0.4,
        ..Default::default()
    };
    let out = run_session(&input, 2048, 512, 1, pld, 17).await;
    assert_eq!(out.received, input);
    assert!(
        out.stats.retransmits >= 1,
        "a 40% drop rate over 12 segments should force retransmission"
    );
}

/// Duplication and corruption together: duplicates must be idempotent and
/// corrupted payloads must be dropped (never written to the output).
#[tokio::test]
async fn transfer_survives_duplication_and_corruption() {
    let input = patterned_input(10 * 512);
    let pld = PldConfig {
        p_duplicate: 0.4,
        p_corrupt: 0.3,
        ..Default::default()
    };
    let out = run_session(&input, 2048, 512, 1, pld, 23).await;
    assert_eq!(out.received, input);
}

/// Reordering through the hold slot: out-of-order arrivals are buffered by
/// position and the output is still in order.
#[tokio::test]
async fn transfer_survives_reordering() {
    let input = patterned_input(12 * 512);
    let pld = PldConfig {
        p_order: 0.4,
        max_order: 2,
        ..Default::default()
    };
    let out = run_session(&input, 2048, 512, 1, pld, 29).await;
    assert_eq!(out.received, input);
}

/// Random delays let later segments overtake earlier ones.
#[tokio::test]
async fn transfer_survives_delays() {
    let input = patterned_input(10 * 512);
    let pld = PldConfig {
        p_delay: 0.6,
        max_delay: Duration::from_millis(150),
        ..Default::default()
    };
    let out = run_session(&input, 2048, 512, 1, pld, 31).await;
    assert_eq!(out.received, input);
}

/// Everything at once, mildly: the union of all recovery paths.
#[tokio::test]
async fn transfer_survives_combined_impairments() {
    let input = patterned_input(10 * 512);
    let pld = PldConfig {
        p_drop: 0.1,
        p_duplicate: 0.1,
        p_corrupt: 0.1,
        p_order: 0.1,
        max_order: 3,
        p_delay: 0.2,
        max_delay: Duration::from_millis(100),
    };
    let out = run_session(&input, 2048, 512, 1, pld, 37).await;
    assert_eq!(out.received, input);
}
