//! Record types for ingested contract events
//!
//! These structs represent the data stored in the event store.
//! They use postcard for binary serialization, which is compact and deterministic.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A `RequestCreated` event: a wallet asked the contract for randomness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    /// Requesting wallet (topic 1)
    pub wallet_address: Address,
    /// Request identifier rendered as a decimal string (topic 2)
    pub request_id: String,
    /// Number of spins paid for (data payload)
    pub amount: U256,
    /// Hash of the emitting transaction
    pub transaction_hash: B256,
    /// Position of the log within its block
    pub log_index: u64,
    /// Block containing the event
    pub block_number: u64,
    /// Timestamp of the containing block (Unix epoch seconds)
    pub observed_at: u64,
}

/// A `ResponseCreated` event: the contract fulfilled a request with prizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    /// Wallet the response belongs to (topic 1)
    pub wallet_address: Address,
    /// Request identifier rendered as a decimal string (topic 2)
    pub request_id: String,
    /// Prize identifiers, in emission order
    pub prize_ids: Vec<u64>,
    /// Hash of the emitting transaction
    pub transaction_hash: B256,
    /// Position of the log within its block
    pub log_index: u64,
    /// Block containing the event
    pub block_number: u64,
    /// Timestamp of the containing block (Unix epoch seconds)
    pub observed_at: u64,
}

/// Marker for a window, identified by its first block, that could not be ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailedBlock {
    pub block_number: u64,
}
