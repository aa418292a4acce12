//! Contract log decoding
//!
//! Maps raw `eth_getLogs` records emitted by the randomness contract onto
//! typed events. Classification is by topic0 against the keccak hashes of
//! the two event signatures; everything else is `Unrecognized`.
//!
//! Decoding is tolerant: short or oddly sized payloads produce truncated
//! values instead of errors. [`payload_anomaly`] reports those cases so the
//! caller can log them.

use crate::records::{RequestEvent, ResponseEvent};
use crate::reward::PAYOUTS;
use crate::types::Log;
use alloy_primitives::{keccak256, Address, B256, U256};
use std::sync::OnceLock;

/// Solidity signature of the request event.
pub const REQUEST_CREATED: &str = "RequestCreated(address,uint256,uint256)";

/// Solidity signature of the response event.
pub const RESPONSE_CREATED: &str = "ResponseCreated(address,uint256,uint256[])";

/// Byte offset of the first prize word: the dynamic array's offset and
/// length words are skipped.
const PRIZE_OFFSET: usize = 64;

const WORD: usize = 32;

/// The event kinds this decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Request,
    Response,
}

impl EventKind {
    pub fn signature(self) -> &'static str {
        match self {
            EventKind::Request => REQUEST_CREATED,
            EventKind::Response => RESPONSE_CREATED,
        }
    }

    /// keccak256 of the event signature, i.e. the expected topic0.
    pub fn topic(self) -> B256 {
        keccak256(self.signature().as_bytes())
    }
}

fn signature_table() -> &'static [(B256, EventKind); 2] {
    static TABLE: OnceLock<[(B256, EventKind); 2]> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            (EventKind::Request.topic(), EventKind::Request),
            (EventKind::Response.topic(), EventKind::Response),
        ]
    })
}

/// Look up the event kind for a topic0 hash.
pub fn classify(topic0: &B256) -> Option<EventKind> {
    signature_table()
        .iter()
        .find(|(topic, _)| topic == topic0)
        .map(|(_, kind)| *kind)
}

/// Payload of a `RequestCreated` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCreated {
    pub wallet_address: Address,
    pub request_id: String,
    pub amount: U256,
}

impl RequestCreated {
    /// Attach log metadata and the block timestamp.
    pub fn into_record(self, log: &Log, observed_at: u64) -> RequestEvent {
        RequestEvent {
            wallet_address: self.wallet_address,
            request_id: self.request_id,
            amount: self.amount,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
            block_number: log.block_number,
            observed_at,
        }
    }
}

/// Payload of a `ResponseCreated` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCreated {
    pub wallet_address: Address,
    pub request_id: String,
    pub prize_ids: Vec<u64>,
}

impl ResponseCreated {
    /// Attach log metadata and the block timestamp.
    pub fn into_record(self, log: &Log, observed_at: u64) -> ResponseEvent {
        ResponseEvent {
            wallet_address: self.wallet_address,
            request_id: self.request_id,
            prize_ids: self.prize_ids,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
            block_number: log.block_number,
            observed_at,
        }
    }
}

/// Result of decoding one log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLog {
    Request(RequestCreated),
    Response(ResponseCreated),
    Unrecognized,
}

/// Decode a log record into a typed event.
///
/// Logs whose topic0 matches neither signature, or which lack the two
/// indexed topics, are `Unrecognized`.
pub fn decode_log(log: &Log) -> DecodedLog {
    let Some(kind) = log.topics.first().and_then(classify) else {
        return DecodedLog::Unrecognized;
    };
    let (Some(wallet), Some(request)) = (log.topics.get(1), log.topics.get(2)) else {
        return DecodedLog::Unrecognized;
    };

    let wallet_address = address_from_topic(wallet);
    let request_id = uint_from_word(request.as_slice()).to_string();

    match kind {
        EventKind::Request => DecodedLog::Request(RequestCreated {
            wallet_address,
            request_id,
            amount: uint_from_word(&log.data),
        }),
        EventKind::Response => DecodedLog::Response(ResponseCreated {
            wallet_address,
            request_id,
            prize_ids: decode_prize_ids(&log.data),
        }),
    }
}

/// Interpret an indexed topic as an address (its low 20 bytes).
pub fn address_from_topic(topic: &B256) -> Address {
    Address::from_slice(&topic.as_slice()[WORD - 20..])
}

/// Interpret big-endian bytes as an unsigned integer.
///
/// Inputs longer than a word keep their low 256 bits.
pub fn uint_from_word(bytes: &[u8]) -> U256 {
    let start = bytes.len().saturating_sub(WORD);
    U256::from_be_slice(&bytes[start..])
}

/// Extract prize identifiers from an ABI-encoded `uint256[]` payload.
///
/// Reads one 32-byte word at a time starting at byte 64 and stops when fewer
/// than 32 bytes remain. Each word is truncated to its low 64 bits.
pub fn decode_prize_ids(data: &[u8]) -> Vec<u64> {
    data.get(PRIZE_OFFSET..)
        .unwrap_or_default()
        .chunks_exact(WORD)
        .map(low_u64)
        .collect()
}

fn low_u64(word: &[u8]) -> u64 {
    word[WORD - 8..]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Describe anything about a matched log that decoding had to paper over.
///
/// Returns `None` for well-formed payloads and for unrelated logs.
pub fn payload_anomaly(log: &Log) -> Option<String> {
    let kind = log.topics.first().and_then(classify)?;
    if log.topics.len() < 3 {
        return Some(format!(
            "{} log has {} topics, expected 3",
            kind.signature(),
            log.topics.len()
        ));
    }

    match kind {
        EventKind::Request if log.data.len() > WORD => Some(format!(
            "request amount payload is {} bytes, only the low {} were kept",
            log.data.len(),
            WORD
        )),
        EventKind::Request => None,
        EventKind::Response => response_anomaly(&log.data),
    }
}

fn response_anomaly(data: &[u8]) -> Option<String> {
    if data.len() < PRIZE_OFFSET {
        return Some(format!(
            "response payload is {} bytes, shorter than the {}-byte array header",
            data.len(),
            PRIZE_OFFSET
        ));
    }
    let tail = (data.len() - PRIZE_OFFSET) % WORD;
    if tail != 0 {
        return Some(format!("response payload has {} trailing bytes", tail));
    }
    let declared = uint_from_word(&data[WORD..PRIZE_OFFSET]);
    let found = (data.len() - PRIZE_OFFSET) / WORD;
    if declared != U256::from(found as u64) {
        return Some(format!(
            "response array declares {} prizes but carries {}",
            declared, found
        ));
    }
    decode_prize_ids(data)
        .into_iter()
        .find(|&id| id >= PAYOUTS.len() as u64)
        .map(|id| format!("prize id {} outside payout table", id))
}
