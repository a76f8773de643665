//! Sync store: raw chain data (blocks, transactions, receipts, logs),
//! per-filter scanned-range bookkeeping, and the memoized RPC result cache.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_core::schema::ChildAddressLocation;
use ponder_core::types::{BlockHeader, LogSummary, ReceiptSummary, TransactionSummary};

pub use memory::MemorySyncStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSyncStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSyncStore;

/// A closed-closed block range, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    fn overlaps_or_touches(&self, other: &Interval) -> bool {
        self.start <= other.end.saturating_add(1) && other.start <= self.end.saturating_add(1)
    }
}

/// Insert `new` into `existing` (assumed already pairwise-disjoint and
/// sorted), merging any overlapping or adjacent ranges. O((n+1) log n).
pub fn merge_intervals(existing: &[Interval], new: Interval) -> Vec<Interval> {
    let mut all: Vec<Interval> = existing.to_vec();
    all.push(new);
    all.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(all.len());
    for interval in all {
        match merged.last_mut() {
            Some(last) if last.overlaps_or_touches(&interval) => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// A fully joined log event: the log itself plus its parent block,
/// transaction, and (if requested) receipt.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub log: LogSummary,
    pub block: BlockHeader,
    pub transaction: TransactionSummary,
    pub receipt: Option<ReceiptSummary>,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone, Default)]
pub struct LogEventQuery {
    pub from_checkpoint: Option<Checkpoint>,
    pub to_checkpoint: Option<Checkpoint>,
    pub chain_id: Option<u64>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn insert_blocks(&self, blocks: &[BlockHeader]) -> Result<(), PonderError>;
    async fn insert_transactions(&self, txs: &[TransactionSummary]) -> Result<(), PonderError>;
    async fn insert_receipts(&self, receipts: &[ReceiptSummary]) -> Result<(), PonderError>;
    async fn insert_logs(&self, logs: &[(LogSummary, Checkpoint)]) -> Result<(), PonderError>;

    async fn insert_log_filter_interval(
        &self,
        filter_id: &str,
        interval: Interval,
    ) -> Result<(), PonderError>;
    async fn get_log_filter_intervals(&self, filter_id: &str) -> Result<Vec<Interval>, PonderError>;

    async fn insert_factory_filter_interval(
        &self,
        factory_id: &str,
        interval: Interval,
    ) -> Result<(), PonderError>;
    async fn get_factory_filter_intervals(
        &self,
        factory_id: &str,
    ) -> Result<Vec<Interval>, PonderError>;

    async fn get_log_events(&self, query: LogEventQuery) -> Result<Vec<LogEvent>, PonderError>;

    async fn get_factory_child_addresses(
        &self,
        factory_address: &str,
        event_selector: &str,
        child_address_location: ChildAddressLocation,
        up_to_block: u64,
    ) -> Result<Vec<String>, PonderError>;

    /// Remove blocks/transactions/receipts/logs/intervals strictly above
    /// `from_block` on `chain_id`. Atomic.
    async fn prune_by_block(&self, chain_id: u64, from_block: u64) -> Result<(), PonderError>;

    async fn get_cached_request(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
    ) -> Result<Option<serde_json::Value>, PonderError>;
    async fn put_cached_request(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
        result: serde_json::Value,
    ) -> Result<(), PonderError>;
}
