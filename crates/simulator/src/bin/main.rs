//! Fast-sync deterministic simulator CLI
//!
//! Syncs one fresh node from a set of serving peers and prints a report.
//!
//! # Example
//!
//! ```bash
//! # Sync 1000 blocks from 4 honest peers
//! fastsync-sim --peers 4 --height 1000
//!
//! # Add a peer serving a forged chain and one that never answers
//! fastsync-sim -p 4 -H 2000 --forging 1 --silent 1 --packet-loss 0.02
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use fastsync_simulator::{Simulator, SimulatorConfig};
use fastsync_sync::SyncConfig;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fast-sync Deterministic Simulator
///
/// Given the same seed, produces identical results every run.
#[derive(Parser, Debug)]
#[command(name = "fastsync-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of honest serving peers
    #[arg(short = 'p', long, default_value = "4")]
    peers: usize,

    /// Height of the chain the peers hold
    #[arg(short = 'H', long, default_value = "1000")]
    height: u64,

    /// Peers serving a chain sealed by another validator
    #[arg(long, default_value = "0")]
    forging: usize,

    /// Peers that accept requests but never answer
    #[arg(long, default_value = "0")]
    silent: usize,

    /// Packet loss rate (0.0-1.0)
    #[arg(long, default_value = "0.0")]
    packet_loss: f64,

    /// One-way network latency in milliseconds
    #[arg(long, default_value = "50")]
    latency_ms: u64,

    /// Blocks requested ahead of the lowest missing height
    #[arg(long, default_value = "40")]
    batch_size: u64,

    /// Request timeout in seconds
    #[arg(long, default_value = "15")]
    request_timeout: u64,

    /// Simulated seconds after which the run is abandoned
    #[arg(short = 'd', long, default_value = "600")]
    duration: u64,

    /// Random seed for deterministic simulation
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,fastsync_simulator=info")),
        )
        .init();

    let args = Args::parse();

    info!(
        peers = args.peers,
        height = args.height,
        forging = args.forging,
        silent = args.silent,
        packet_loss = args.packet_loss,
        seed = args.seed,
        "Starting simulation"
    );

    let sync = SyncConfig {
        request_batch_size: args.batch_size,
        request_timeout: Duration::from_secs(args.request_timeout),
        ..SyncConfig::default()
    };
    let config = SimulatorConfig::new(args.peers, args.height)
        .with_forging_peers(args.forging)
        .with_silent_peers(args.silent)
        .with_packet_loss(args.packet_loss)
        .with_latency(Duration::from_millis(args.latency_ms))
        .with_sync(sync)
        .with_deadline(Duration::from_secs(args.duration))
        .with_seed(args.seed);

    let mut simulator = Simulator::new(config).context("Failed to create simulator")?;
    let report = simulator.run();

    println!("\n{report}");

    if !report.is_success() {
        bail!("node did not catch up with the honest chain");
    }
    Ok(())
}
