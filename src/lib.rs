//! vrf-indexer - randomness contract event ingestion
//!
//! Follows `RequestCreated` / `ResponseCreated` logs of a randomness
//! contract through block history in fixed windows, decodes them and
//! stores them in RocksDB. Windows that fail are journaled for manual
//! reprocessing.

pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod indexer;
pub mod keys;
pub mod records;
pub mod reward;
pub mod rpc;
pub mod store;
pub mod types;

// Re-export the main types for convenience
pub use config::IndexerConfig;
pub use error::IngestError;
pub use indexer::{BlockWindow, Indexer, StepOutcome};
pub use records::{FailedBlock, RequestEvent, ResponseEvent};
pub use reward::{reward_of, reward_of_all, Reward};
pub use rpc::{NodeClient, RpcClient};
pub use store::{EventStore, RocksEventStore};
