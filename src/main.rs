//! eventctl - event store inspection CLI
//!
//! Reads the RocksDB store written by the indexer and prints
//! request/response events, rewards and the failed-window journal.

use vrf_indexer::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
