//! CLI implementation for eventctl
//!
//! Read-only inspection of an event store written by the indexer.
//! All commands output pretty JSON.

use crate::config::parse_address;
use crate::records::{RequestEvent, ResponseEvent};
use crate::reward::{reward_of, reward_of_all, Reward};
use crate::store::RocksEventStore;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Event store CLI tool
#[derive(Parser)]
#[command(name = "eventctl")]
#[command(about = "Inspect ingested randomness request/response events")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, env = "DB_PATH", default_value = "./event_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List request events
    Requests {
        /// Only events from this wallet (hex, with or without 0x prefix)
        #[arg(short, long)]
        wallet: Option<String>,
    },
    /// List response events with their rewards
    Responses {
        /// Only events for this wallet (hex, with or without 0x prefix)
        #[arg(short, long)]
        wallet: Option<String>,
    },
    /// List windows that failed to ingest
    FailedBlocks,
    /// Total rewards per wallet
    Rewards {
        /// Only this wallet (hex, with or without 0x prefix)
        #[arg(short, long)]
        wallet: Option<String>,
    },
}

/// Run the CLI with the given arguments.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = RocksEventStore::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let output = execute(&store, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_wallet(wallet: Option<String>) -> Result<Option<Address>> {
    wallet
        .map(|w| parse_address(&w).with_context(|| format!("Invalid wallet address: {}", w)))
        .transpose()
}

/// Execute a command against an open store and build its JSON output.
pub fn execute(store: &RocksEventStore, command: Commands) -> Result<Value> {
    match command {
        Commands::Requests { wallet } => {
            let wallet = parse_wallet(wallet)?;
            let events: Vec<Value> = store
                .request_events()?
                .iter()
                .filter(|e| wallet.map_or(true, |w| e.wallet_address == w))
                .map(request_json)
                .collect();
            Ok(json!(events))
        }
        Commands::Responses { wallet } => {
            let events = match parse_wallet(wallet)? {
                Some(w) => store.response_events_by_wallet(w)?,
                None => store.response_events()?,
            };
            Ok(json!(events.iter().map(response_json).collect::<Vec<_>>()))
        }
        Commands::FailedBlocks => {
            let blocks: Vec<u64> = store
                .failed_blocks()?
                .into_iter()
                .map(|b| b.block_number)
                .collect();
            Ok(json!(blocks))
        }
        Commands::Rewards { wallet } => match parse_wallet(wallet)? {
            Some(w) => {
                let events = store.response_events_by_wallet(w)?;
                let reward = reward_of_all(events.iter().map(|e| e.prize_ids.as_slice()));
                Ok(reward_json(w, reward))
            }
            None => {
                let mut totals: BTreeMap<Address, Reward> = BTreeMap::new();
                for event in store.response_events()? {
                    totals
                        .entry(event.wallet_address)
                        .or_default()
                        .add_prizes(&event.prize_ids);
                }
                Ok(json!(totals
                    .into_iter()
                    .map(|(w, r)| reward_json(w, r))
                    .collect::<Vec<_>>()))
            }
        },
    }
}

fn request_json(e: &RequestEvent) -> Value {
    json!({
        "user": e.wallet_address.to_checksum(None),
        "requestId": e.request_id,
        "amount": e.amount.to_string(),
        "txHash": format!("{:?}", e.transaction_hash),
        "index": e.log_index,
        "block": e.block_number,
        "time": e.observed_at,
    })
}

fn response_json(e: &ResponseEvent) -> Value {
    json!({
        "user": e.wallet_address.to_checksum(None),
        "requestId": e.request_id,
        "prizeIds": e.prize_ids,
        "reward": reward_of(&e.prize_ids),
        "txHash": format!("{:?}", e.transaction_hash),
        "index": e.log_index,
        "block": e.block_number,
        "time": e.observed_at,
    })
}

fn reward_json(wallet: Address, reward: Reward) -> Value {
    json!({
        "address": wallet.to_checksum(None),
        "reward": reward,
    })
}
