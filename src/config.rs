//! Indexer configuration
//!
//! Holds the settings the ingestion loop runs with and validates them
//! once at startup. Where the values come from (flags, environment) is
//! the binary's concern.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::time::Duration;

/// Blocks fetched per `eth_getLogs` window.
pub const DEFAULT_WINDOW_SIZE: u64 = 5000;

/// Pause before an open-ended fetch once the cursor is near the head.
pub const DEFAULT_CATCH_UP_DELAY: Duration = Duration::from_secs(60);

/// Per-request HTTP timeout for the node client.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one indexer instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// JSON-RPC endpoint of the node
    pub rpc_url: String,
    /// Contract whose events are ingested
    pub contract: Address,
    /// First block of the first window
    pub start_block: u64,
    /// Width of each fetch window in blocks
    pub window_size: u64,
    /// Suspension before fetching through the head
    pub catch_up_delay: Duration,
    /// Timeout applied to every RPC request
    pub rpc_timeout: Duration,
}

impl IndexerConfig {
    /// Build a config with default window, delay and timeout.
    pub fn new(rpc_url: impl Into<String>, contract: &str, start_block: u64) -> Result<Self> {
        let contract = parse_address(contract).context("Invalid contract address")?;
        Ok(Self {
            rpc_url: rpc_url.into(),
            contract,
            start_block,
            window_size: DEFAULT_WINDOW_SIZE,
            catch_up_delay: DEFAULT_CATCH_UP_DELAY,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        })
    }

    /// Override the window width. Zero is rejected.
    pub fn with_window_size(mut self, window_size: u64) -> Result<Self> {
        if window_size == 0 {
            anyhow::bail!("Window size must be greater than zero");
        }
        self.window_size = window_size;
        Ok(self)
    }

    pub fn with_catch_up_delay(mut self, delay: Duration) -> Self {
        self.catch_up_delay = delay;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

/// Pad an odd-length hex string with a leading zero.
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix, in any letter case.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s)
        .with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }

    Ok(Address::from_slice(&bytes))
}
