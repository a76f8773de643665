//! Realtime sync: polls the chain head, extends or rewinds the tracked
//! window, and reports finalization progress each tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::{PonderError, SyncPhase};
use ponder_core::reorg::ReorgDetector;
use ponder_core::schema::LogFilter;
use ponder_core::tracker::BlockTracker;
use ponder_core::types::BlockHeader;
use ponder_rpc::RpcError;
use ponder_storage::sync::{Interval, SyncStore};

use crate::fetcher::{EvmFetcher, EvmRpcClient};
use crate::historical::process_chunk;

fn rpc_err(e: RpcError) -> PonderError {
    PonderError::Rpc(e.to_string())
}

/// Per-network sync state (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSyncState {
    Syncing,
    Realtime,
    Stalled,
    Errored,
}

/// What the caller (the engine's indexing-store reconciliation layer) must
/// do in response to a detected reorg: discard indexed state above the
/// ancestor checkpoint and resume dispatch from there.
#[derive(Debug, Clone)]
pub struct ReorgRecovery {
    pub ancestor_block: u64,
    pub ancestor_checkpoint: Checkpoint,
    pub dropped_blocks: Vec<BlockHeader>,
}

#[derive(Debug, Clone)]
pub struct RealtimeTick {
    pub state: NetworkSyncState,
    pub new_head: Option<BlockHeader>,
    pub finalized_block: u64,
    pub reorg: Option<ReorgRecovery>,
}

/// What `RealtimeSync::run` settled on after a tick failed, per the
/// startup/steady-state-dependent RPC error policy: `onFatalError` vs
/// `onReloadableError`.
#[derive(Debug)]
pub enum RealtimeOutcome {
    /// `stop` was set; the loop exited cleanly.
    Stopped,
    Reload(PonderError),
    Fatal(PonderError),
}

pub struct RealtimeSync<C> {
    fetcher: Arc<EvmFetcher<C>>,
    store: Arc<dyn SyncStore>,
    chain_id: u64,
    filters: Vec<LogFilter>,
    tracker: BlockTracker,
    reorg_detector: ReorgDetector,
    state: NetworkSyncState,
    stall_timeout: Duration,
    finality_block_count: u64,
    last_progress: Instant,
    /// `true` once a tick has successfully reached the chain head at
    /// least once. Before that, errors are classified as startup errors.
    reached_realtime: bool,
}

impl<C: EvmRpcClient> RealtimeSync<C> {
    pub fn new(
        fetcher: Arc<EvmFetcher<C>>,
        store: Arc<dyn SyncStore>,
        chain_id: u64,
        filters: Vec<LogFilter>,
        window_size: usize,
        finality_block_count: u64,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            chain_id,
            filters,
            tracker: BlockTracker::new(window_size),
            reorg_detector: ReorgDetector::new(finality_block_count),
            state: NetworkSyncState::Syncing,
            stall_timeout,
            finality_block_count,
            last_progress: Instant::now(),
            reached_realtime: false,
        }
    }

    pub fn state(&self) -> NetworkSyncState {
        self.state
    }

    fn sync_phase(&self) -> SyncPhase {
        if self.reached_realtime {
            SyncPhase::SteadyState
        } else {
            SyncPhase::Startup
        }
    }

    /// Poll once: fetch head, extend or reorg-recover, report finalization.
    pub async fn tick(&mut self) -> Result<RealtimeTick, PonderError> {
        let head_number = self.fetcher.head_block_number().await.map_err(rpc_err)?;
        let head = match self.fetcher.block_by_number(head_number).await.map_err(rpc_err)? {
            Some((header, _)) => header,
            None => return Ok(self.no_progress_tick(head_number)),
        };

        let reorg = match self.tracker.head().cloned() {
            None => {
                self.tracker.push(head.clone()).ok();
                self.last_progress = Instant::now();
                self.state = NetworkSyncState::Realtime;
                self.reached_realtime = true;
                None
            }
            Some(tip) if tip.hash == head.hash => {
                if self.last_progress.elapsed() > self.stall_timeout {
                    self.state = NetworkSyncState::Stalled;
                }
                return Ok(RealtimeTick {
                    state: self.state,
                    new_head: None,
                    finalized_block: self.finalized_block(tip.number),
                    reorg: None,
                });
            }
            Some(tip) if head.extends(&tip) => {
                self.extend(tip.number + 1, head.number).await?;
                self.tracker.push(head.clone()).ok();
                self.last_progress = Instant::now();
                self.state = NetworkSyncState::Realtime;
                self.reached_realtime = true;
                None
            }
            Some(tip) => Some(self.recover_from_reorg(&tip, &head).await?),
        };

        Ok(RealtimeTick {
            state: self.state,
            new_head: Some(head.clone()),
            finalized_block: self.finalized_block(head.number),
            reorg,
        })
    }

    fn no_progress_tick(&mut self, observed_head: u64) -> RealtimeTick {
        if self.last_progress.elapsed() > self.stall_timeout {
            self.state = NetworkSyncState::Stalled;
        }
        RealtimeTick {
            state: self.state,
            new_head: None,
            finalized_block: self.finalized_block(observed_head),
            reorg: None,
        }
    }

    fn finalized_block(&self, head: u64) -> u64 {
        head.saturating_sub(self.finality_block_count)
    }

    async fn extend(&self, from: u64, to: u64) -> Result<(), PonderError> {
        for filter in &self.filters {
            process_chunk(&self.fetcher, self.store.as_ref(), self.chain_id, from, to, filter, filter.include_transaction_receipts)
                .await?;
        }
        self.store.insert_log_filter_interval(&format!("chain:{}", self.chain_id), Interval::new(from, to)).await?;
        Ok(())
    }

    async fn recover_from_reorg(&mut self, tip: &BlockHeader, head: &BlockHeader) -> Result<ReorgRecovery, PonderError> {
        let window = self.tracker.window();
        let event = self.reorg_detector.check(head, tip, &window);
        let depth = event.as_ref().map(|e| e.depth).unwrap_or(1);
        let dropped_blocks = event.map(|e| e.dropped_blocks).unwrap_or_else(|| vec![tip.clone()]);
        let ancestor_block = tip.number.saturating_sub(depth);

        tracing::warn!(chain_id = self.chain_id, ancestor_block, depth, "reorg recovery: pruning and resyncing");

        self.store.prune_by_block(self.chain_id, ancestor_block).await?;
        self.extend(ancestor_block + 1, head.number).await?;
        self.tracker = BlockTracker::new(window.len().max(1));
        self.tracker.push(head.clone()).ok();
        self.state = NetworkSyncState::Realtime;
        self.last_progress = Instant::now();

        Ok(ReorgRecovery {
            ancestor_block,
            ancestor_checkpoint: Checkpoint::new(0, self.chain_id, ancestor_block, 0, 0),
            dropped_blocks,
        })
    }

    /// Run the poll loop until `stop` is set, invoking `on_tick` after every
    /// successful poll and sleeping `poll_interval` between polls.
    ///
    /// A tick failure is classified against the current sync phase: a
    /// permanent RPC/chain-response failure is fatal if the chain head
    /// has never been reached, reloadable once it has.
    pub async fn run(
        &mut self,
        poll_interval: Duration,
        stop: Arc<AtomicBool>,
        mut on_tick: impl FnMut(&RealtimeTick),
    ) -> RealtimeOutcome {
        while !stop.load(Ordering::Relaxed) {
            match self.tick().await {
                Ok(tick) => on_tick(&tick),
                Err(e) => {
                    let phase = self.sync_phase();
                    self.state = NetworkSyncState::Errored;
                    return if e.is_reloadable(phase) {
                        RealtimeOutcome::Reload(e)
                    } else {
                        RealtimeOutcome::Fatal(e)
                    };
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
        RealtimeOutcome::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;

    use ponder_core::types::TransactionSummary;
    use ponder_rpc::{RequestQueue, RequestQueueConfig};
    use ponder_storage::sync::MemorySyncStore;

    #[test]
    fn finalized_block_saturates_at_zero() {
        let finality = 64u64;
        assert_eq!(5u64.saturating_sub(finality), 0);
        assert_eq!(100u64.saturating_sub(finality), 36);
    }

    fn header(number: u64, hash: &str, parent_hash: &str) -> BlockHeader {
        BlockHeader {
            chain_id: 1,
            number,
            hash: hash.into(),
            parent_hash: parent_hash.into(),
            timestamp: number,
            miner: "0xm".into(),
            gas_limit: "0x0".into(),
            gas_used: "0x0".into(),
            base_fee_per_gas: None,
            state_root: "0x0".into(),
            transactions_root: "0x0".into(),
            receipts_root: "0x0".into(),
            logs_bloom: "0x0".into(),
            extra_data: "0x0".into(),
            mix_hash: "0x0".into(),
            nonce: "0x0".into(),
            difficulty: "0x0".into(),
            size: None,
        }
    }

    /// Always fails `get_block_number` with a permanent RPC error — no
    /// tick ever succeeds.
    struct AlwaysFailingClient;

    #[async_trait]
    impl EvmRpcClient for AlwaysFailingClient {
        async fn chain_id(&self) -> Result<u64, RpcError> {
            Ok(1)
        }
        async fn get_block_number(&self) -> Result<u64, RpcError> {
            Err(RpcError::Permanent("node rejected request".into()))
        }
        async fn get_block_by_number(
            &self,
            _number: u64,
        ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError> {
            Ok(None)
        }
        async fn get_block_by_hash(
            &self,
            _hash: &str,
        ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError> {
            Ok(None)
        }
        async fn get_transaction_receipt(
            &self,
            _tx_hash: &str,
        ) -> Result<Option<ponder_core::types::ReceiptSummary>, RpcError> {
            Ok(None)
        }
        async fn get_logs(&self, _from: u64, _to: u64, _filter: &LogFilter) -> Result<Vec<ponder_core::types::LogSummary>, RpcError> {
            Ok(vec![])
        }
        async fn call(&self, _to: &str, _data: &str, _block_number: Option<u64>) -> Result<String, RpcError> {
            Ok("0x".into())
        }
    }

    fn fetcher<C: EvmRpcClient>(client: C) -> Arc<EvmFetcher<C>> {
        Arc::new(EvmFetcher::new(client, Arc::new(RequestQueue::new(RequestQueueConfig::default())), 2000))
    }

    #[tokio::test]
    async fn run_classifies_rpc_failure_before_first_tick_as_fatal() {
        let mut sync = RealtimeSync::new(
            fetcher(AlwaysFailingClient),
            Arc::new(MemorySyncStore::new()),
            1,
            vec![LogFilter::new(1)],
            10,
            64,
            Duration::from_secs(60),
        );

        let outcome = sync.run(Duration::from_millis(1), Arc::new(AtomicBool::new(false)), |_| {}).await;

        assert!(matches!(outcome, RealtimeOutcome::Fatal(_)));
        assert_eq!(sync.state(), NetworkSyncState::Errored);
    }

    /// Succeeds once, reaching realtime, then fails every call after —
    /// the same RPC error class should now be reloadable.
    struct SucceedsOnceThenFails {
        calls: AtomicU64,
    }

    #[async_trait]
    impl EvmRpcClient for SucceedsOnceThenFails {
        async fn chain_id(&self) -> Result<u64, RpcError> {
            Ok(1)
        }
        async fn get_block_number(&self) -> Result<u64, RpcError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(1)
            } else {
                Err(RpcError::Permanent("node rejected request".into()))
            }
        }
        async fn get_block_by_number(
            &self,
            number: u64,
        ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError> {
            Ok(Some((header(number, "0x1", "0x0"), vec![])))
        }
        async fn get_block_by_hash(
            &self,
            _hash: &str,
        ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError> {
            Ok(None)
        }
        async fn get_transaction_receipt(
            &self,
            _tx_hash: &str,
        ) -> Result<Option<ponder_core::types::ReceiptSummary>, RpcError> {
            Ok(None)
        }
        async fn get_logs(&self, _from: u64, _to: u64, _filter: &LogFilter) -> Result<Vec<ponder_core::types::LogSummary>, RpcError> {
            Ok(vec![])
        }
        async fn call(&self, _to: &str, _data: &str, _block_number: Option<u64>) -> Result<String, RpcError> {
            Ok("0x".into())
        }
    }

    #[tokio::test]
    async fn run_classifies_rpc_failure_after_reaching_realtime_as_reloadable() {
        let mut sync = RealtimeSync::new(
            fetcher(SucceedsOnceThenFails { calls: AtomicU64::new(0) }),
            Arc::new(MemorySyncStore::new()),
            1,
            vec![LogFilter::new(1)],
            10,
            64,
            Duration::from_secs(60),
        );

        let outcome = sync.run(Duration::from_millis(1), Arc::new(AtomicBool::new(false)), |_| {}).await;

        assert!(matches!(outcome, RealtimeOutcome::Reload(_)));
        assert_eq!(sync.state(), NetworkSyncState::Errored);
    }
}
