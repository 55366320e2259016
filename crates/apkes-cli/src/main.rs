//! APKES command-line demo.
//!
//! Adaptable Pairwise Key Establishment Scheme - link-layer handshake for
//! resource-constrained wireless nodes.

use std::time::Duration;

use clap::{Parser, Subcommand};

use apkes_core::config::ApkesConfig;
use apkes_core::engine::Engine;
use apkes_core::flash::InMemoryFlashStore;
use apkes_core::frame::LoopbackNetwork;
use apkes_core::identity::ExtAddr;
use apkes_core::secret_provider::PlainSecretProvider;

/// APKES - bootstrap pairwise keys between one-hop neighbors.
#[derive(Parser)]
#[command(name = "apkes")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process two-node handshake over an in-memory radio
    /// loopback and report the resulting pairwise key.
    Demo {
        /// Number of bootstrap rounds to run
        #[arg(long, default_value_t = 6)]
        rounds: u32,

        /// Seconds per bootstrap round
        #[arg(long, default_value_t = 7)]
        round_secs: u64,

        /// Network-wide shared secret, as 32 hex characters (16 bytes)
        #[arg(long)]
        secret: Option<String>,
    },

    /// Print a freshly generated 16-byte shared secret, hex-encoded.
    GenSecret,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    match cli.command {
        Commands::Demo {
            rounds,
            round_secs,
            secret,
        } => run_demo(rounds, round_secs, secret).await,
        Commands::GenSecret => {
            let secret = apkes_crypto::random::random_16();
            println!("{}", hex::encode(secret));
            Ok(())
        }
    }
}

async fn run_demo(rounds: u32, round_secs: u64, secret: Option<String>) -> anyhow::Result<()> {
    let secret_bytes = match secret {
        Some(hex_str) => {
            let bytes = hex::decode(hex_str.trim())?;
            let array: [u8; 16] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("secret must be exactly 16 bytes (32 hex chars)"))?;
            array
        }
        None => apkes_crypto::random::random_16(),
    };

    let config = ApkesConfig::default()
        .with_rounds(rounds)
        .with_round_duration(Duration::from_secs(round_secs));

    let network = LoopbackNetwork::new();
    let addr_a = ExtAddr::new([0xA1; 8]);
    let addr_b = ExtAddr::new([0xB2; 8]);

    let engine_a = Engine::new(
        addr_a,
        config.clone(),
        Box::new(network.join(addr_a)),
        Box::new(PlainSecretProvider::new(secret_bytes)),
        Box::new(InMemoryFlashStore::new(4096)),
    )?;
    let engine_b = Engine::new(
        addr_b,
        config,
        Box::new(network.join(addr_b)),
        Box::new(PlainSecretProvider::new(secret_bytes)),
        Box::new(InMemoryFlashStore::new(4096)),
    )?;

    println!("node A: {addr_a}");
    println!("node B: {addr_b}");
    println!("shared secret: {}", hex::encode(secret_bytes));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let a_handle = {
                let engine_a = engine_a.clone();
                tokio::task::spawn_local(async move {
                    engine_a.run_bootstrap(|_| {}).await;
                })
            };
            let b_handle = {
                let engine_b = engine_b.clone();
                tokio::task::spawn_local(async move {
                    engine_b.run_bootstrap(|_| {}).await;
                })
            };
            let _ = tokio::join!(a_handle, b_handle);
        })
        .await;

    match (
        engine_a.neighbor_status(addr_b),
        engine_a.pairwise_key(addr_b),
    ) {
        (Some(status), Some(key)) => {
            println!("A's view of B: {status:?}, pairwise key {}", hex::encode(key));
        }
        _ => println!("A never completed a handshake with B"),
    }
    match (
        engine_b.neighbor_status(addr_a),
        engine_b.pairwise_key(addr_a),
    ) {
        (Some(status), Some(key)) => {
            println!("B's view of A: {status:?}, pairwise key {}", hex::encode(key));
        }
        _ => println!("B never completed a handshake with A"),
    }

    Ok(())
}
