//! Main ingestion loop
//!
//! Walks block history in fixed-size windows starting at a configured block,
//! decodes the contract's logs in each window and appends them to the event
//! store. Once a window would pass the chain head the loop pauses, then
//! fetches through whatever the head is at that point.
//!
//! A window that fails anywhere (head lookup, log fetch, timestamp lookup,
//! write) is dropped as a whole and journaled as a failed block. The cursor
//! advances past it either way; failed windows are not retried here.

use crate::config::IndexerConfig;
use crate::decoder::{decode_log, payload_anomaly, DecodedLog};
use crate::error::IngestError;
use crate::records::{RequestEvent, ResponseEvent};
use crate::rpc::NodeClient;
use crate::store::EventStore;
use crate::types::Log;
use alloy_primitives::Address;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A contiguous block range fetched in one `eth_getLogs` call.
///
/// `to = None` means "through the head at fetch time".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from: u64,
    pub to: Option<u64>,
}

impl BlockWindow {
    /// `[from, from + size]`.
    pub fn bounded(from: u64, size: u64) -> Self {
        Self {
            from,
            to: Some(from.saturating_add(size)),
        }
    }

    /// `[from, head]`, with the head resolved by the node.
    pub fn open_ended(from: u64) -> Self {
        Self { from, to: None }
    }

    /// Whether the window reaches past `head`.
    pub fn overruns(&self, head: u64) -> bool {
        self.to.map_or(true, |to| to > head)
    }
}

impl fmt::Display for BlockWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, latest]", self.from),
        }
    }
}

/// What one window produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSummary {
    pub window: BlockWindow,
    pub logs: usize,
    pub requests: usize,
    pub responses: usize,
}

/// Result of a single loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The window was fetched, decoded and written.
    Ingested(WindowSummary),
    /// The window starting at this block was journaled as failed.
    Failed(u64),
    /// Shutdown arrived during the catch-up pause; nothing was fetched.
    Interrupted,
}

/// Ingestion cursor over the contract's event history.
pub struct Indexer<N, S> {
    node: N,
    store: S,
    contract: Address,
    cursor: u64,
    window_size: u64,
    catch_up_delay: Duration,
}

impl<N: NodeClient, S: EventStore> Indexer<N, S> {
    /// Create an indexer positioned at `config.start_block`.
    pub fn new(node: N, store: S, config: &IndexerConfig) -> Self {
        Self {
            node,
            store,
            contract: config.contract,
            cursor: config.start_block,
            window_size: config.window_size,
            catch_up_delay: config.catch_up_delay,
        }
    }

    /// First block of the next window.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run until `shutdown` turns true.
    ///
    /// The signal is honored between windows and during the catch-up pause.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting indexer loop at block {} (window {} blocks, contract 0x{:x})",
            self.cursor, self.window_size, self.contract
        );

        while !*shutdown.borrow() {
            if self.step(&mut shutdown).await == StepOutcome::Interrupted {
                break;
            }
        }

        info!("Indexer stopped, next window would start at block {}", self.cursor);
    }

    /// Process the window at the cursor and advance it.
    pub async fn step(&mut self, shutdown: &mut watch::Receiver<bool>) -> StepOutcome {
        let from = self.cursor;

        let outcome = match self.ingest_window(shutdown).await {
            Ok(Some(summary)) => {
                info!(
                    "Window {}: {} logs, {} requests, {} responses",
                    summary.window, summary.logs, summary.requests, summary.responses
                );
                StepOutcome::Ingested(summary)
            }
            Ok(None) => return StepOutcome::Interrupted,
            Err(e) => {
                error!(kind = e.kind(), "Window starting at block {} failed: {}", from, e);
                if let Err(e) = self.store.append_failed_block(from) {
                    error!("Failed to record failed block {}: {:#}", from, e);
                }
                StepOutcome::Failed(from)
            }
        };

        self.cursor = from.saturating_add(self.window_size);
        outcome
    }

    /// Fetch, decode and persist the window at the cursor.
    ///
    /// Returns `Ok(None)` if shutdown interrupted the catch-up pause.
    async fn ingest_window(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<WindowSummary>, IngestError> {
        let head = self
            .node
            .block_number()
            .await
            .map_err(IngestError::NodeUnavailable)?;

        let mut window = BlockWindow::bounded(self.cursor, self.window_size);
        if window.overruns(head) {
            info!(
                "Caught up with head {} (window {}), waiting {:?} before fetching through latest",
                head, window, self.catch_up_delay
            );
            if !self.pause(shutdown).await {
                return Ok(None);
            }
            window = BlockWindow::open_ended(self.cursor);
        }

        info!("Fetching logs for window {}", window);
        let logs = self
            .node
            .get_logs(self.contract, window.from, window.to)
            .await
            .map_err(IngestError::NodeUnavailable)?;

        let (requests, responses) = self.decode_logs(&logs).await?;

        self.store
            .append_window(&requests, &responses)
            .map_err(IngestError::PersistenceFailure)?;

        Ok(Some(WindowSummary {
            window,
            logs: logs.len(),
            requests: requests.len(),
            responses: responses.len(),
        }))
    }

    /// Decode every log and stamp each matched event with its block time.
    ///
    /// Timestamps are fetched one event at a time.
    async fn decode_logs(
        &self,
        logs: &[Log],
    ) -> Result<(Vec<RequestEvent>, Vec<ResponseEvent>), IngestError> {
        let mut requests = Vec::new();
        let mut responses = Vec::new();

        for log in logs {
            if let Some(anomaly) = payload_anomaly(log) {
                warn!(
                    "Log {} in tx {:?}: {}",
                    log.log_index,
                    log.transaction_hash,
                    IngestError::DecodeAnomaly(anomaly)
                );
            }

            match decode_log(log) {
                DecodedLog::Request(event) => {
                    let observed_at = self.observed_at(log).await?;
                    requests.push(event.into_record(log, observed_at));
                }
                DecodedLog::Response(event) => {
                    let observed_at = self.observed_at(log).await?;
                    responses.push(event.into_record(log, observed_at));
                }
                DecodedLog::Unrecognized => {
                    debug!("Skipping unrecognized log {} in block {}", log.log_index, log.block_number);
                }
            }
        }

        Ok((requests, responses))
    }

    async fn observed_at(&self, log: &Log) -> Result<u64, IngestError> {
        self.node
            .block_timestamp(log.block_number)
            .await
            .map_err(|e| {
                IngestError::NodeUnavailable(
                    e.context(format!("Failed to fetch timestamp of block {}", log.block_number)),
                )
            })
    }

    /// Sleep for the catch-up delay. Returns false if shutdown arrived first.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.catch_up_delay) => true,
            _ = wait_for_stop(shutdown) => false,
        }
    }
}

/// Resolve once shutdown is requested. Never resolves if the sender is gone.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::EventKind;
    use crate::records::FailedBlock;
    use alloy_primitives::{address, b256, B256, U256};
    use anyhow::Result;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn contract() -> Address {
        address!("5fbdb2315678afecb367f032d93f642f64180aa3")
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct LogCall {
        from: u64,
        to: Option<u64>,
        at: Instant,
    }

    /// In-memory node with a fixed head and canned logs per window start.
    #[derive(Default)]
    struct FakeNode {
        head: u64,
        logs: HashMap<u64, Vec<Log>>,
        fail_head: bool,
        fail_logs_from: HashSet<u64>,
        fail_timestamp_of: HashSet<u64>,
        log_calls: Mutex<Vec<LogCall>>,
        timestamp_calls: Mutex<Vec<u64>>,
    }

    impl FakeNode {
        fn with_head(head: u64) -> Self {
            Self {
                head,
                ..Default::default()
            }
        }
    }

    impl NodeClient for FakeNode {
        async fn block_number(&self) -> Result<u64> {
            if self.fail_head {
                anyhow::bail!("connection refused");
            }
            Ok(self.head)
        }

        async fn get_logs(&self, address: Address, from: u64, to: Option<u64>) -> Result<Vec<Log>> {
            assert_eq!(address, contract());
            self.log_calls.lock().unwrap().push(LogCall {
                from,
                to,
                at: Instant::now(),
            });
            if self.fail_logs_from.contains(&from) {
                anyhow::bail!("query timeout");
            }
            Ok(self.logs.get(&from).cloned().unwrap_or_default())
        }

        async fn block_timestamp(&self, block: u64) -> Result<u64> {
            self.timestamp_calls.lock().unwrap().push(block);
            if self.fail_timestamp_of.contains(&block) {
                anyhow::bail!("header not found");
            }
            Ok(1_600_000_000 + block)
        }
    }

    /// In-memory store that counts window commits and can be told to fail them.
    #[derive(Default)]
    struct FakeStore {
        requests: Mutex<Vec<RequestEvent>>,
        responses: Mutex<Vec<ResponseEvent>>,
        failed: Mutex<Vec<FailedBlock>>,
        event_writes: Mutex<usize>,
        fail_event_writes: bool,
        fail_response_writes: bool,
    }

    impl EventStore for FakeStore {
        fn append_request_events(&self, batch: &[RequestEvent]) -> Result<()> {
            if self.fail_event_writes {
                anyhow::bail!("disk full");
            }
            self.requests.lock().unwrap().extend_from_slice(batch);
            Ok(())
        }

        fn append_response_events(&self, batch: &[ResponseEvent]) -> Result<()> {
            if self.fail_event_writes || self.fail_response_writes {
                anyhow::bail!("disk full");
            }
            self.responses.lock().unwrap().extend_from_slice(batch);
            Ok(())
        }

        fn append_failed_block(&self, block: u64) -> Result<()> {
            self.failed.lock().unwrap().push(FailedBlock {
                block_number: block,
            });
            Ok(())
        }

        fn append_window(
            &self,
            requests: &[RequestEvent],
            responses: &[ResponseEvent],
        ) -> Result<()> {
            if self.fail_event_writes || (self.fail_response_writes && !responses.is_empty()) {
                anyhow::bail!("disk full");
            }
            if requests.is_empty() && responses.is_empty() {
                return Ok(());
            }
            *self.event_writes.lock().unwrap() += 1;
            self.requests.lock().unwrap().extend_from_slice(requests);
            self.responses.lock().unwrap().extend_from_slice(responses);
            Ok(())
        }
    }

    fn config(start_block: u64) -> IndexerConfig {
        IndexerConfig::new("http://127.0.0.1:8545", &format!("{:x}", contract()), start_block)
            .unwrap()
    }

    fn word(value: u64) -> B256 {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&value.to_be_bytes());
        B256::from(w)
    }

    fn wallet_topic() -> B256 {
        let mut w = [0u8; 32];
        w[12..].copy_from_slice(address!("70997970c51812dc3a010c7d01b50e0d17dc79c8").as_slice());
        B256::from(w)
    }

    fn request_log(block: u64, log_index: u64, request_id: u64, amount: u64) -> Log {
        Log {
            address: contract(),
            topics: vec![EventKind::Request.topic(), wallet_topic(), word(request_id)],
            data: word(amount).to_vec(),
            block_number: block,
            transaction_hash: b256!("fedcba0987654321fedcba0987654321fedcba0987654321fedcba0987654321"),
            log_index,
        }
    }

    fn response_log(block: u64, log_index: u64, request_id: u64, prizes: &[u64]) -> Log {
        let mut data = word(32).to_vec();
        data.extend_from_slice(word(prizes.len() as u64).as_slice());
        for p in prizes {
            data.extend_from_slice(word(*p).as_slice());
        }
        Log {
            address: contract(),
            topics: vec![EventKind::Response.topic(), wallet_topic(), word(request_id)],
            data,
            block_number: block,
            transaction_hash: b256!("abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890"),
            log_index,
        }
    }

    fn other_log(block: u64) -> Log {
        Log {
            address: contract(),
            topics: vec![B256::ZERO],
            data: Vec::new(),
            block_number: block,
            transaction_hash: B256::ZERO,
            log_index: 9,
        }
    }

    #[test]
    fn test_block_window() {
        let w = BlockWindow::bounded(100, 5000);
        assert_eq!(w.to, Some(5100));
        assert!(!w.overruns(5100));
        assert!(w.overruns(5099));
        assert!(BlockWindow::open_ended(100).overruns(u64::MAX));
        assert_eq!(w.to_string(), "[100, 5100]");
        assert_eq!(BlockWindow::open_ended(7).to_string(), "[7, latest]");
        assert_eq!(BlockWindow::bounded(u64::MAX - 1, 5000).to, Some(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_window_when_head_is_far() {
        let mut node = FakeNode::with_head(20_000);
        node.logs.insert(
            1000,
            vec![
                request_log(1200, 0, 77, 3),
                other_log(1300),
                response_log(1500, 4, 77, &[2, 7]),
            ],
        );
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(1000));
        let (_tx, mut rx) = watch::channel(false);

        let start = Instant::now();
        let outcome = indexer.step(&mut rx).await;

        assert_eq!(
            outcome,
            StepOutcome::Ingested(WindowSummary {
                window: BlockWindow::bounded(1000, 5000),
                logs: 3,
                requests: 1,
                responses: 1,
            })
        );
        assert_eq!(indexer.cursor(), 6000);
        assert_eq!(Instant::now(), start, "no pause expected");

        let calls = indexer.node.log_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!((calls[0].from, calls[0].to), (1000, Some(6000)));

        // One timestamp lookup per matched event, none for the unrelated log.
        assert_eq!(*indexer.node.timestamp_calls.lock().unwrap(), vec![1200, 1500]);

        let requests = indexer.store().requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_id, "77");
        assert_eq!(requests[0].amount, U256::from(3u64));
        assert_eq!(requests[0].observed_at, 1_600_001_200);

        let responses = indexer.store().responses.lock().unwrap().clone();
        assert_eq!(responses[0].prize_ids, vec![2, 7]);
        assert_eq!(responses[0].log_index, 4);
        assert!(indexer.store().failed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_exactly_at_window_end_is_bounded() {
        let node = FakeNode::with_head(5000);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(0));
        let (_tx, mut rx) = watch::channel(false);

        indexer.step(&mut rx).await;

        let calls = indexer.node.log_calls.lock().unwrap().clone();
        assert_eq!((calls[0].from, calls[0].to), (0, Some(5000)));
        assert_eq!(indexer.cursor(), 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_up_pauses_then_fetches_open_ended() {
        let mut node = FakeNode::with_head(3000);
        node.logs.insert(1000, vec![request_log(2500, 0, 1, 1)]);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(1000));
        let (_tx, mut rx) = watch::channel(false);

        let start = Instant::now();
        let outcome = indexer.step(&mut rx).await;

        let calls = indexer.node.log_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!((calls[0].from, calls[0].to), (1000, None));
        assert!(calls[0].at.duration_since(start) >= Duration::from_secs(60));

        match outcome {
            StepOutcome::Ingested(summary) => {
                assert_eq!(summary.window, BlockWindow::open_ended(1000));
                assert_eq!(summary.requests, 1);
            }
            other => panic!("expected ingested window, got {:?}", other),
        }
        assert_eq!(indexer.cursor(), 6000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_fetch_failure_journals_window() {
        let mut node = FakeNode::with_head(100_000);
        node.fail_logs_from.insert(5000);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(5000));
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(indexer.step(&mut rx).await, StepOutcome::Failed(5000));
        assert_eq!(indexer.cursor(), 10_000);
        assert_eq!(
            *indexer.store().failed.lock().unwrap(),
            vec![FailedBlock { block_number: 5000 }]
        );
        assert_eq!(*indexer.store().event_writes.lock().unwrap(), 0);

        // The next window is not a retry of the failed one.
        indexer.step(&mut rx).await;
        let calls = indexer.node.log_calls.lock().unwrap().clone();
        assert_eq!(calls.iter().map(|c| c.from).collect::<Vec<_>>(), vec![5000, 10_000]);
        assert_eq!(indexer.store().failed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_failure_journals_window() {
        let node = FakeNode {
            fail_head: true,
            ..Default::default()
        };
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(42));
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(indexer.step(&mut rx).await, StepOutcome::Failed(42));
        assert_eq!(indexer.cursor(), 5042);
        assert!(indexer.node.log_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamp_failure_discards_whole_window() {
        let mut node = FakeNode::with_head(100_000);
        node.logs.insert(
            0,
            vec![
                request_log(10, 0, 1, 1),
                response_log(20, 0, 1, &[4]),
                request_log(30, 0, 2, 1),
            ],
        );
        node.fail_timestamp_of.insert(30);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(0));
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(indexer.step(&mut rx).await, StepOutcome::Failed(0));
        assert_eq!(indexer.cursor(), 5000);
        assert!(indexer.store().requests.lock().unwrap().is_empty());
        assert!(indexer.store().responses.lock().unwrap().is_empty());
        assert_eq!(
            *indexer.store().failed.lock().unwrap(),
            vec![FailedBlock { block_number: 0 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_journals_window() {
        let mut node = FakeNode::with_head(100_000);
        node.logs.insert(0, vec![request_log(10, 0, 1, 1), response_log(20, 0, 1, &[2])]);
        let store = FakeStore {
            fail_event_writes: true,
            ..Default::default()
        };
        let mut indexer = Indexer::new(node, store, &config(0));
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(indexer.step(&mut rx).await, StepOutcome::Failed(0));
        assert_eq!(indexer.cursor(), 5000);
        assert_eq!(*indexer.store().event_writes.lock().unwrap(), 0);
        assert_eq!(
            *indexer.store().failed.lock().unwrap(),
            vec![FailedBlock { block_number: 0 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_write_failure_keeps_no_requests() {
        let mut node = FakeNode::with_head(100_000);
        node.logs.insert(0, vec![request_log(10, 0, 1, 1), response_log(20, 0, 1, &[2])]);
        let store = FakeStore {
            fail_response_writes: true,
            ..Default::default()
        };
        let mut indexer = Indexer::new(node, store, &config(0));
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(indexer.step(&mut rx).await, StepOutcome::Failed(0));
        assert_eq!(indexer.cursor(), 5000);
        assert!(indexer.store().requests.lock().unwrap().is_empty());
        assert!(indexer.store().responses.lock().unwrap().is_empty());
        assert_eq!(
            *indexer.store().failed.lock().unwrap(),
            vec![FailedBlock { block_number: 0 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_response_is_tolerated() {
        let mut node = FakeNode::with_head(100_000);
        let mut log = response_log(10, 0, 5, &[1]);
        log.data.truncate(40);
        node.logs.insert(0, vec![log]);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(0));
        let (_tx, mut rx) = watch::channel(false);

        assert!(matches!(indexer.step(&mut rx).await, StepOutcome::Ingested(_)));
        let responses = indexer.store().responses.lock().unwrap().clone();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].prize_ids.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_catch_up_pause() {
        let node = FakeNode::with_head(10);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(0));
        let (tx, mut rx) = watch::channel(false);

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            tx.send(true).unwrap();
        };
        let (outcome, _) = tokio::join!(indexer.step(&mut rx), stopper);

        assert_eq!(outcome, StepOutcome::Interrupted);
        assert_eq!(indexer.cursor(), 0);
        assert!(indexer.node.log_calls.lock().unwrap().is_empty());
        assert!(indexer.store().failed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_advances_until_shutdown() {
        let node = FakeNode::with_head(10);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(0));
        let (tx, rx) = watch::channel(false);

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(150)).await;
            tx.send(true).unwrap();
        };
        tokio::join!(indexer.run(rx), stopper);

        // Pauses end at 60s and 120s; the third pause is cut short at 150s.
        let calls = indexer.node.log_calls.lock().unwrap().clone();
        assert_eq!(calls.iter().map(|c| c.from).collect::<Vec<_>>(), vec![0, 5000]);
        assert!(calls.iter().all(|c| c.to.is_none()));
        assert_eq!(indexer.cursor(), 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_immediately_when_already_stopped() {
        let node = FakeNode::with_head(100_000);
        let mut indexer = Indexer::new(node, FakeStore::default(), &config(0));
        let (_tx, rx) = watch::channel(true);

        indexer.run(rx).await;
        assert_eq!(indexer.cursor(), 0);
    }
}
