//! JSON-RPC client for Ethereum nodes
//!
//! Provides a typed interface to Ethereum JSON-RPC endpoints.
//! Handles hex string parsing and error handling.

use crate::types::{parse_hex_u64, BlockHeader, Log};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

/// The node operations the indexer depends on.
pub trait NodeClient {
    /// Current chain head block number.
    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Logs emitted by `address` in `from..=to`.
    ///
    /// `to = None` fetches through the head as seen by the node when the call executes.
    fn get_logs(
        &self,
        address: Address,
        from: u64,
        to: Option<u64>,
    ) -> impl Future<Output = Result<Vec<Log>>> + Send;

    /// Timestamp (Unix epoch seconds) of a block.
    fn block_timestamp(&self, block: u64) -> impl Future<Output = Result<u64>> + Send;
}

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client whose requests time out after `timeout`.
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        extract_result(json)
    }

    /// Get a block header by number.
    pub async fn get_block_header(&self, block: u64) -> Result<BlockHeader> {
        let params = json!([format!("0x{:x}", block), false]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        header_from_result(block, result)
    }
}

impl NodeClient for RpcClient {
    async fn block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number = result
            .as_str()
            .context("Block number response is not a string")?;
        parse_hex_u64(number)
            .map_err(anyhow::Error::msg)
            .context("Failed to parse block number")
    }

    async fn get_logs(&self, address: Address, from: u64, to: Option<u64>) -> Result<Vec<Log>> {
        let result = self
            .call("eth_getLogs", log_filter(address, from, to))
            .await?;
        serde_json::from_value(result).context("Failed to deserialize logs")
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64> {
        Ok(self.get_block_header(block).await?.timestamp)
    }
}

/// Build the `eth_getLogs` params for a contract and block range.
fn log_filter(address: Address, from: u64, to: Option<u64>) -> Value {
    let to_block = match to {
        Some(to) => format!("0x{:x}", to),
        None => "latest".to_string(),
    };
    json!([{
        "address": format!("0x{:x}", address),
        "fromBlock": format!("0x{:x}", from),
        "toBlock": to_block,
    }])
}

/// Parse an `eth_getBlockByNumber` result, rejecting a missing or different block.
fn header_from_result(block: u64, result: Value) -> Result<BlockHeader> {
    if result.is_null() {
        anyhow::bail!("Block {} not found", block);
    }
    let header: BlockHeader =
        serde_json::from_value(result).context("Failed to deserialize block header")?;
    if header.number != block {
        anyhow::bail!("Requested block {} but node returned block {}", block, header.number);
    }
    Ok(header)
}

/// Pull `result` out of a JSON-RPC response, surfacing `error` as an error.
fn extract_result(json: Value) -> Result<Value> {
    if let Some(error) = json.get("error") {
        anyhow::bail!("RPC error: {}", error);
    }

    json.get("result")
        .cloned()
        .context("RPC response missing 'result' field")
}
