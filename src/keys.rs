//! Key encoding and decoding utilities
//!
//! All keys use a single-byte prefix followed by binary data.
//! Big-endian block numbers keep RocksDB iteration in chain order.

/// Prefix byte of request event keys.
pub const REQUEST_KEY_PREFIX: u8 = b'Q';

/// Prefix byte of response event keys.
pub const RESPONSE_KEY_PREFIX: u8 = b'P';

/// Encode a request event key.
///
/// Format: byte 'Q' (0x51) + block_number (8 bytes, big-endian) + log_index (8 bytes, big-endian)
/// Total length: 17 bytes
pub fn encode_request_key(block: u64, log_index: u64) -> Vec<u8> {
    encode_event_key(REQUEST_KEY_PREFIX, block, log_index)
}

/// Encode a response event key.
///
/// Format: byte 'P' (0x50) + block_number (8 bytes, big-endian) + log_index (8 bytes, big-endian)
/// Total length: 17 bytes
pub fn encode_response_key(block: u64, log_index: u64) -> Vec<u8> {
    encode_event_key(RESPONSE_KEY_PREFIX, block, log_index)
}

fn encode_event_key(prefix: u8, block: u64, log_index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(prefix);
    key.extend_from_slice(&block.to_be_bytes());
    key.extend_from_slice(&log_index.to_be_bytes());
    key
}

/// Decode an event key with the given prefix into (block_number, log_index).
pub fn decode_event_key(prefix: u8, key: &[u8]) -> Option<(u64, u64)> {
    if key.len() != 17 || key[0] != prefix {
        return None;
    }
    let block = u64::from_be_bytes(key[1..9].try_into().ok()?);
    let log_index = u64::from_be_bytes(key[9..17].try_into().ok()?);
    Some((block, log_index))
}

/// Encode a failed block key.
///
/// Format: byte 'F' (0x46) + block_number (8 bytes, big-endian)
/// Total length: 9 bytes
pub fn encode_failed_block_key(block: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(b'F');
    key.extend_from_slice(&block.to_be_bytes());
    key
}

/// Decode a failed block key into its block number.
pub fn decode_failed_block_key(key: &[u8]) -> Option<u64> {
    if key.len() != 9 || key[0] != b'F' {
        return None;
    }
    Some(u64::from_be_bytes(key[1..9].try_into().ok()?))
}
