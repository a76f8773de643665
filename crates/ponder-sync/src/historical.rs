//! Historical sync: computes the gap set between requested ranges and
//! already-cached intervals, then backfills each gap with bounded
//! concurrency.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_core::schema::{FactoryFilter, LogFilter};
use ponder_core::types::{BlockHeader, LogSummary, ReceiptSummary, TransactionSummary};
use ponder_rpc::{split_log_range, RpcError};
use ponder_storage::sync::{Interval, SyncStore};

use crate::fetcher::{EvmFetcher, EvmRpcClient};

fn rpc_err(e: RpcError) -> PonderError {
    PonderError::Rpc(e.to_string())
}

/// A static, address-pinned source to backfill.
#[derive(Debug, Clone)]
pub struct LogFilterSource {
    pub id: String,
    pub chain_id: u64,
    pub filter: LogFilter,
    pub start_block: u64,
    pub end_block: Option<u64>,
}

/// A factory-derived source: discover children from the factory's own log
/// filter, then backfill each child as a dynamic address.
#[derive(Debug, Clone)]
pub struct FactorySource {
    pub id: String,
    pub chain_id: u64,
    pub factory: FactoryFilter,
    pub start_block: u64,
    pub end_block: Option<u64>,
}

/// Gap set: `[requested_start, requested_end] \ cached` (cached assumed
/// sorted and pairwise-disjoint, as `merge_intervals` maintains it).
pub fn gap_set(requested: (u64, u64), cached: &[Interval]) -> Vec<Interval> {
    let (start, end) = requested;
    if start > end {
        return Vec::new();
    }
    let mut gaps = Vec::new();
    let mut cursor = start;
    for iv in cached.iter().filter(|iv| iv.end >= start && iv.start <= end) {
        let iv_start = iv.start.max(start);
        let iv_end = iv.end.min(end);
        if cursor < iv_start {
            gaps.push(Interval::new(cursor, iv_start - 1));
        }
        cursor = cursor.max(iv_end).saturating_add(1);
        if cursor > end {
            break;
        }
    }
    if cursor <= end {
        gaps.push(Interval::new(cursor, end));
    }
    gaps
}

pub struct HistoricalSync<C> {
    fetcher: Arc<EvmFetcher<C>>,
    store: Arc<dyn SyncStore>,
    max_block_range: u64,
    max_concurrency: usize,
}

impl<C: EvmRpcClient + 'static> HistoricalSync<C> {
    pub fn new(
        fetcher: Arc<EvmFetcher<C>>,
        store: Arc<dyn SyncStore>,
        max_block_range: u64,
        max_concurrency: usize,
    ) -> Self {
        Self { fetcher, store, max_block_range, max_concurrency }
    }

    /// Backfill a single static log filter source up to `tip`.
    pub async fn run_log_filter(&self, source: &LogFilterSource, tip: u64) -> Result<(), PonderError> {
        let end = source.end_block.unwrap_or(tip).min(tip);
        if source.start_block > end {
            return Ok(());
        }

        let cached = self.store.get_log_filter_intervals(&source.id).await?;
        let chunks = gap_set((source.start_block, end), &cached)
            .into_iter()
            .flat_map(|g| split_log_range(g.start, g.end, self.max_block_range))
            .collect::<Vec<_>>();

        let results: Vec<Result<(), PonderError>> = stream::iter(chunks.into_iter().map(|(s, e)| {
            let fetcher = self.fetcher.clone();
            let store = self.store.clone();
            let filter = source.filter.clone();
            let chain_id = source.chain_id;
            let filter_id = source.id.clone();
            let include_receipts = source.filter.include_transaction_receipts;
            async move {
                process_chunk(&fetcher, store.as_ref(), chain_id, s, e, &filter, include_receipts).await?;
                store.insert_log_filter_interval(&filter_id, Interval::new(s, e)).await
            }
        }))
        .buffer_unordered(self.max_concurrency)
        .collect()
        .await;

        for r in results {
            r?;
        }
        Ok(())
    }

    /// Backfill a factory source: discover children from the factory's own
    /// creation events, then backfill each child address as a dynamic
    /// log filter bounded by `[max(start_block, factory_start_block), tip]`.
    pub async fn run_factory(&self, source: &FactorySource, tip: u64) -> Result<(), PonderError> {
        let end = source.end_block.unwrap_or(tip).min(tip);
        if source.start_block > end {
            return Ok(());
        }

        let discovery_filter = LogFilter {
            chain_id: source.chain_id,
            address: Some(source.factory.factory_address.clone()),
            topics: [Some(source.factory.event_selector.clone()), None, None, None],
            include_transaction_receipts: false,
        };
        let discovery_source = LogFilterSource {
            id: format!("{}:discovery", source.id),
            chain_id: source.chain_id,
            filter: discovery_filter,
            start_block: source.start_block,
            end_block: Some(end),
        };
        self.run_log_filter(&discovery_source, end).await?;

        let children = self
            .store
            .get_factory_child_addresses(
                &source.factory.factory_address,
                &source.factory.event_selector,
                source.factory.child_address_location,
                end,
            )
            .await?;

        if children.is_empty() {
            return Ok(());
        }

        // Child creation block isn't tracked separately from the discovery
        // pass above, so every child is scanned from `source.start_block`;
        // the gap set still prevents re-fetching already-cached ranges.
        let mut topics = source.factory.topics.clone();
        topics[0] = None;
        let child_filter = LogFilter {
            chain_id: source.chain_id,
            address: None,
            topics,
            include_transaction_receipts: source.factory.include_transaction_receipts,
        };
        for child in children {
            let child_source = LogFilterSource {
                id: format!("{}:child:{}", source.id, child.to_lowercase()),
                chain_id: source.chain_id,
                filter: LogFilter { address: Some(child), ..child_filter.clone() },
                start_block: source.start_block,
                end_block: Some(end),
            };
            self.run_log_filter(&child_source, end).await?;
        }

        Ok(())
    }
}

/// Fetch, resolve, and persist one `[from, to]` chunk: logs, their parent
/// blocks/transactions (deduped by hash), and receipts if requested.
pub(crate) async fn process_chunk<C: EvmRpcClient>(
    fetcher: &EvmFetcher<C>,
    store: &dyn SyncStore,
    chain_id: u64,
    from: u64,
    to: u64,
    filter: &LogFilter,
    include_receipts: bool,
) -> Result<(), PonderError> {
    let logs = fetcher.logs(from, to, filter).await.map_err(rpc_err)?;
    let live_logs: Vec<&LogSummary> = logs.iter().filter(|l| !l.removed).collect();
    if live_logs.is_empty() {
        return Ok(());
    }

    let mut blocks: HashMap<String, BlockHeader> = HashMap::new();
    let mut transactions: HashMap<String, TransactionSummary> = HashMap::new();
    for log in &live_logs {
        if !blocks.contains_key(&log.block_hash) {
            if let Some((block, txs)) = fetcher.block_by_hash(&log.block_hash).await.map_err(rpc_err)? {
                for tx in txs {
                    transactions.insert(tx.hash.clone(), tx);
                }
                blocks.insert(block.hash.clone(), block);
            }
        }
    }

    let mut receipts: HashMap<String, ReceiptSummary> = HashMap::new();
    if include_receipts {
        for log in &live_logs {
            if !receipts.contains_key(&log.transaction_hash) {
                if let Some(receipt) = fetcher.transaction_receipt(&log.transaction_hash).await.map_err(rpc_err)? {
                    receipts.insert(receipt.transaction_hash.clone(), receipt);
                }
            }
        }
    }

    let checkpointed_logs: Vec<(LogSummary, Checkpoint)> = live_logs
        .iter()
        .map(|log| {
            let timestamp = blocks.get(&log.block_hash).map(|b| b.timestamp).unwrap_or(0);
            let tx_index = transactions.get(&log.transaction_hash).map(|t| t.transaction_index).unwrap_or(0);
            let checkpoint = Checkpoint::new(timestamp, chain_id, log.block_number, tx_index, log.log_index);
            ((*log).clone(), checkpoint)
        })
        .collect();

    let block_values: Vec<BlockHeader> = blocks.into_values().collect();
    let tx_values: Vec<TransactionSummary> = transactions.into_values().collect();
    let receipt_values: Vec<ReceiptSummary> = receipts.into_values().collect();

    if !block_values.is_empty() {
        store.insert_blocks(&block_values).await?;
    }
    if !tx_values.is_empty() {
        store.insert_transactions(&tx_values).await?;
    }
    if !receipt_values.is_empty() {
        store.insert_receipts(&receipt_values).await?;
    }
    store.insert_logs(&checkpointed_logs).await?;

    tracing::debug!(from, to, logs = checkpointed_logs.len(), "backfill chunk persisted");
    Ok(())
}
