//! Entry point for `stp`.
//!
//! Parses CLI arguments and dispatches into either **initiator** (sender) or
//! **responder** (receiver) mode.  All protocol work is delegated to library
//! modules; `main.rs` owns only process setup (logging, argument parsing)
//! and the non-zero exit on fatal errors.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use stp::initiator::{self, InitiatorConfig};
use stp::pld::PldConfig;
use stp::responder::{self, ResponderConfig};

/// Simplified TCP-like reliable transport over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a responder, impairing the link along the way.
    Initiator {
        /// Responder host IP.
        host: IpAddr,
        /// Responder port.
        port: u16,
        /// File to transfer.
        file: PathBuf,
        /// Maximum window size in bytes.
        mws: usize,
        /// Maximum segment size in bytes.
        mss: usize,
        /// Deviation gain used in the retransmission timeout.
        gamma: u32,
        /// Probability that a segment is dropped.
        p_drop: f64,
        /// Probability that a segment is duplicated.
        p_duplicate: f64,
        /// Probability that a segment is corrupted.
        p_corrupt: f64,
        /// Probability that a segment is withheld for reordering.
        p_order: f64,
        /// Forwardings before a withheld segment is released.
        max_order: u32,
        /// Probability that a segment is delayed.
        p_delay: f64,
        /// Maximum delay in milliseconds.
        max_delay: u64,
        /// PRNG seed (reproduces the ISN and the impairment sequence).
        seed: u64,
        /// Event log destination.
        #[arg(long, default_value = "Sender_log.txt")]
        log: PathBuf,
    },
    /// Receive a file from an initiator.
    Responder {
        /// Local port to listen on.
        port: u16,
        /// Where to write the received file.
        file: PathBuf,
        /// Event log destination.
        #[arg(long, default_value = "Receiver_log.txt")]
        log: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.mode {
        Mode::Initiator {
            host,
            port,
            file,
            mws,
            mss,
            gamma,
            p_drop,
            p_duplicate,
            p_corrupt,
            p_order,
            max_order,
            p_delay,
            max_delay,
            seed,
            log,
        } => {
            let config = InitiatorConfig {
                peer: SocketAddr::new(host, port),
                file,
                mws,
                mss,
                gamma,
                pld: PldConfig {
                    p_drop,
                    p_duplicate,
                    p_corrupt,
                    p_order,
                    max_order,
                    p_delay,
                    max_delay: Duration::from_millis(max_delay),
                },
                seed,
                log_path: log,
            };
            initiator::run(config).await.map(|stats| {
                log::info!(
                    "sent {} bytes in {} segments ({} retransmits, {} duplicate ACKs)",
                    stats.bytes_sent,
                    stats.segments,
                    stats.retransmits,
                    stats.duplicate_acks
                );
            })
        }
        Mode::Responder { port, file, log } => {
            let config = ResponderConfig {
                listen: SocketAddr::new("0.0.0.0".parse().unwrap(), port),
                output: file,
                log_path: log,
            };
            responder::run(config).await.map(|bytes| {
                log::info!("received {bytes} bytes");
            })
        }
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
}
