//! EventStore trait and RocksDB implementation
//!
//! Provides durable storage for decoded request/response events and for
//! the journal of windows that failed to ingest.
//! Uses RocksDB with column families for efficient organization.

use crate::keys::{
    decode_event_key, decode_failed_block_key, encode_failed_block_key, encode_request_key,
    encode_response_key, REQUEST_KEY_PREFIX, RESPONSE_KEY_PREFIX,
};
use crate::records::{FailedBlock, RequestEvent, ResponseEvent};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;

const CF_REQUESTS: &str = "request_events";
const CF_RESPONSES: &str = "response_events";
const CF_FAILED: &str = "failed_blocks";

/// Trait defining the write interface the indexer needs from storage.
///
/// Every call is atomic on its own. Empty batches are no-ops.
pub trait EventStore {
    /// Append a batch of request events.
    fn append_request_events(&self, batch: &[RequestEvent]) -> Result<()>;

    /// Append a batch of response events.
    fn append_response_events(&self, batch: &[ResponseEvent]) -> Result<()>;

    /// Record that the window starting at `block` could not be ingested.
    fn append_failed_block(&self, block: u64) -> Result<()>;

    /// Append everything decoded from one window.
    ///
    /// Requests and responses commit together or not at all.
    fn append_window(&self, requests: &[RequestEvent], responses: &[ResponseEvent]) -> Result<()>;
}

/// RocksDB-backed implementation of EventStore.
///
/// Uses column families to organize different types of data:
/// - request_events: `RequestCreated` records keyed by (block, log index)
/// - response_events: `ResponseCreated` records keyed by (block, log index)
/// - failed_blocks: first block of each window that failed
pub struct RocksEventStore {
    db: DB,
}

impl RocksEventStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new(CF_REQUESTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_RESPONSES, Options::default()),
            ColumnFamilyDescriptor::new(CF_FAILED, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    /// Get a column family handle by name.
    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }

    fn batch_requests(&self, batch: &mut WriteBatch, events: &[RequestEvent]) -> Result<()> {
        let cf = self.get_cf(CF_REQUESTS)?;
        for event in events {
            let key = encode_request_key(event.block_number, event.log_index);
            let value =
                postcard::to_allocvec(event).context("Failed to serialize request event")?;
            batch.put_cf(cf, key, value);
        }
        Ok(())
    }

    fn batch_responses(&self, batch: &mut WriteBatch, events: &[ResponseEvent]) -> Result<()> {
        let cf = self.get_cf(CF_RESPONSES)?;
        for event in events {
            let key = encode_response_key(event.block_number, event.log_index);
            let value =
                postcard::to_allocvec(event).context("Failed to serialize response event")?;
            batch.put_cf(cf, key, value);
        }
        Ok(())
    }

    /// Read every record in a column family, in key order.
    ///
    /// Every key must carry `prefix`.
    fn scan<T: DeserializeOwned>(&self, name: &str, prefix: u8) -> Result<Vec<T>> {
        let cf = self.get_cf(name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            if decode_event_key(prefix, &key).is_none() {
                anyhow::bail!("Malformed key in '{}': {}", name, hex::encode(&key));
            }
            let record = postcard::from_bytes(&value)
                .with_context(|| format!("Failed to deserialize record in '{}'", name))?;
            records.push(record);
        }
        Ok(records)
    }

    /// All request events, ordered by (block, log index).
    pub fn request_events(&self) -> Result<Vec<RequestEvent>> {
        self.scan(CF_REQUESTS, REQUEST_KEY_PREFIX)
    }

    /// All response events, ordered by (block, log index).
    pub fn response_events(&self) -> Result<Vec<ResponseEvent>> {
        self.scan(CF_RESPONSES, RESPONSE_KEY_PREFIX)
    }

    /// Response events belonging to one wallet.
    pub fn response_events_by_wallet(&self, wallet: Address) -> Result<Vec<ResponseEvent>> {
        Ok(self
            .response_events()?
            .into_iter()
            .filter(|e| e.wallet_address == wallet)
            .collect())
    }

    /// The failed-window journal, ascending by block.
    pub fn failed_blocks(&self) -> Result<Vec<FailedBlock>> {
        let cf = self.get_cf(CF_FAILED)?;
        let mut blocks = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.context("Failed to read iterator")?;
            let block_number = decode_failed_block_key(&key)
                .with_context(|| format!("Malformed failed block key: {}", hex::encode(&key)))?;
            blocks.push(FailedBlock { block_number });
        }
        Ok(blocks)
    }
}

impl EventStore for RocksEventStore {
    fn append_request_events(&self, events: &[RequestEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        self.batch_requests(&mut batch, events)?;
        self.db
            .write(batch)
            .context("Failed to write request events")
    }

    fn append_response_events(&self, events: &[ResponseEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        self.batch_responses(&mut batch, events)?;
        self.db
            .write(batch)
            .context("Failed to write response events")
    }

    fn append_failed_block(&self, block: u64) -> Result<()> {
        let cf = self.get_cf(CF_FAILED)?;
        let key = encode_failed_block_key(block);
        self.db
            .put_cf(cf, &key, b"")
            .context("Failed to put failed block")
    }

    fn append_window(&self, requests: &[RequestEvent], responses: &[ResponseEvent]) -> Result<()> {
        if requests.is_empty() && responses.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        self.batch_requests(&mut batch, requests)?;
        self.batch_responses(&mut batch, responses)?;
        self.db
            .write(batch)
            .context("Failed to write window events")
    }
}
