//! Randomness contract indexer binary
//!
//! Walks the contract's event history from a starting block, decodes
//! request/response logs and stores them, then keeps following the head.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vrf_indexer::config::{IndexerConfig, DEFAULT_WINDOW_SIZE};
use vrf_indexer::{Indexer, RocksEventStore, RpcClient};

/// Randomness contract event indexer
#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Ingest RequestCreated/ResponseCreated events into a local store")]
struct Args {
    /// RPC endpoint URL (e.g., https://eth.llamarpc.com)
    #[arg(short, long, env = "RPC", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Address of the randomness contract
    #[arg(short, long, env = "CONTRACT_ADDRESS")]
    contract: String,

    /// Block to start ingesting from
    #[arg(short, long, env = "FROM_BLOCK", default_value_t = 0)]
    from_block: u64,

    /// Path to RocksDB database directory
    #[arg(short, long, env = "DB_PATH", default_value = "./event_db")]
    db_path: PathBuf,

    /// Blocks per eth_getLogs window
    #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
    window_size: u64,

    /// Seconds to wait before fetching through the head once caught up
    #[arg(long, default_value_t = 60)]
    catch_up_delay_secs: u64,

    /// Per-request RPC timeout in seconds
    #[arg(long, default_value_t = 30)]
    rpc_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = IndexerConfig::new(args.rpc_url, &args.contract, args.from_block)?
        .with_window_size(args.window_size)?
        .with_catch_up_delay(Duration::from_secs(args.catch_up_delay_secs))
        .with_rpc_timeout(Duration::from_secs(args.rpc_timeout_secs));

    info!("Starting randomness event indexer");
    info!("RPC URL: {}", config.rpc_url);
    info!("Contract: {}", config.contract.to_checksum(None));
    info!("Database: {:?}", args.db_path);

    let rpc = RpcClient::new(config.rpc_url.clone(), config.rpc_timeout)?;

    let store = RocksEventStore::open(&args.db_path)
        .with_context(|| format!("Failed to open database at {:?}", args.db_path))?;

    let mut indexer = Indexer::new(rpc, store, &config);

    // Stop between windows (or mid-pause) on Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown_tx.send(true);
        }
    });

    indexer.run(shutdown_rx).await;

    info!("Indexer stopped at block {}", indexer.cursor());
    Ok(())
}
