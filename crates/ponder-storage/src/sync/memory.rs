//! In-memory sync store backend — test double, no persistence.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_core::schema::ChildAddressLocation;
use ponder_core::types::{BlockHeader, LogSummary, ReceiptSummary, TransactionSummary};

use super::{Interval, LogEvent, LogEventQuery, SyncStore, merge_intervals};

#[derive(Default)]
pub struct MemorySyncStore {
    blocks: Mutex<HashMap<(u64, String), BlockHeader>>,
    transactions: Mutex<HashMap<(u64, String), TransactionSummary>>,
    receipts: Mutex<HashMap<(u64, String), ReceiptSummary>>,
    logs: Mutex<Vec<(LogSummary, Checkpoint)>>,
    log_filter_intervals: Mutex<HashMap<String, Vec<Interval>>>,
    factory_filter_intervals: Mutex<HashMap<String, Vec<Interval>>>,
    rpc_cache: Mutex<HashMap<(u64, u64, String), serde_json::Value>>,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for MemorySyncStore {
    async fn insert_blocks(&self, blocks: &[BlockHeader]) -> Result<(), PonderError> {
        let mut store = self.blocks.lock().unwrap();
        for b in blocks {
            store.insert((b.chain_id, b.hash.clone()), b.clone());
        }
        Ok(())
    }

    async fn insert_transactions(&self, txs: &[TransactionSummary]) -> Result<(), PonderError> {
        let mut store = self.transactions.lock().unwrap();
        for t in txs {
            store.insert((t.chain_id, t.hash.clone()), t.clone());
        }
        Ok(())
    }

    async fn insert_receipts(&self, receipts: &[ReceiptSummary]) -> Result<(), PonderError> {
        let mut store = self.receipts.lock().unwrap();
        for r in receipts {
            store.insert((r.chain_id, r.transaction_hash.clone()), r.clone());
        }
        Ok(())
    }

    async fn insert_logs(&self, logs: &[(LogSummary, Checkpoint)]) -> Result<(), PonderError> {
        self.logs.lock().unwrap().extend(logs.iter().cloned());
        Ok(())
    }

    async fn insert_log_filter_interval(
        &self,
        filter_id: &str,
        interval: Interval,
    ) -> Result<(), PonderError> {
        let mut store = self.log_filter_intervals.lock().unwrap();
        let entry = store.entry(filter_id.to_string()).or_default();
        *entry = merge_intervals(entry, interval);
        Ok(())
    }

    async fn get_log_filter_intervals(&self, filter_id: &str) -> Result<Vec<Interval>, PonderError> {
        Ok(self
            .log_filter_intervals
            .lock()
            .unwrap()
            .get(filter_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_factory_filter_interval(
        &self,
        factory_id: &str,
        interval: Interval,
    ) -> Result<(), PonderError> {
        let mut store = self.factory_filter_intervals.lock().unwrap();
        let entry = store.entry(factory_id.to_string()).or_default();
        *entry = merge_intervals(entry, interval);
        Ok(())
    }

    async fn get_factory_filter_intervals(
        &self,
        factory_id: &str,
    ) -> Result<Vec<Interval>, PonderError> {
        Ok(self
            .factory_filter_intervals
            .lock()
            .unwrap()
            .get(factory_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_log_events(&self, query: LogEventQuery) -> Result<Vec<LogEvent>, PonderError> {
        let blocks = self.blocks.lock().unwrap();
        let transactions = self.transactions.lock().unwrap();
        let receipts = self.receipts.lock().unwrap();
        let logs = self.logs.lock().unwrap();

        let mut events: Vec<LogEvent> = Vec::new();
        for (log, checkpoint) in logs.iter() {
            if let Some(chain_id) = query.chain_id {
                if log.chain_id != chain_id {
                    continue;
                }
            }
            if let Some(from) = query.from_checkpoint {
                if *checkpoint < from {
                    continue;
                }
            }
            if let Some(to) = query.to_checkpoint {
                if *checkpoint > to {
                    continue;
                }
            }
            let block = match blocks.get(&(log.chain_id, log.block_hash.clone())) {
                Some(b) => b.clone(),
                None => continue,
            };
            let transaction = match transactions.get(&(log.chain_id, log.transaction_hash.clone())) {
                Some(t) => t.clone(),
                None => continue,
            };
            let receipt = receipts.get(&(log.chain_id, log.transaction_hash.clone())).cloned();
            events.push(LogEvent {
                log: log.clone(),
                block,
                transaction,
                receipt,
                checkpoint: *checkpoint,
            });
        }
        events.sort_by_key(|e| e.checkpoint);
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn get_factory_child_addresses(
        &self,
        factory_address: &str,
        event_selector: &str,
        child_address_location: ChildAddressLocation,
        up_to_block: u64,
    ) -> Result<Vec<String>, PonderError> {
        let logs = self.logs.lock().unwrap();
        let mut addrs: Vec<String> = logs
            .iter()
            .filter(|(log, _)| {
                log.address.eq_ignore_ascii_case(factory_address)
                    && log.block_number <= up_to_block
                    && log.topic0().map(|t| t.eq_ignore_ascii_case(event_selector)).unwrap_or(false)
            })
            .filter_map(|(log, _)| child_address_location.extract(&log.topics, &log.data))
            .collect();
        addrs.sort();
        addrs.dedup();
        Ok(addrs)
    }

    async fn prune_by_block(&self, chain_id: u64, from_block: u64) -> Result<(), PonderError> {
        self.blocks
            .lock()
            .unwrap()
            .retain(|(c, _), b| *c != chain_id || b.number <= from_block);
        self.transactions
            .lock()
            .unwrap()
            .retain(|(c, _), t| *c != chain_id || t.block_number <= from_block);
        self.receipts
            .lock()
            .unwrap()
            .retain(|(c, _), r| *c != chain_id || r.block_number <= from_block);
        self.logs
            .lock()
            .unwrap()
            .retain(|(log, _)| log.chain_id != chain_id || log.block_number <= from_block);
        Ok(())
    }

    async fn get_cached_request(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
    ) -> Result<Option<serde_json::Value>, PonderError> {
        Ok(self
            .rpc_cache
            .lock()
            .unwrap()
            .get(&(chain_id, block_number, request.to_string()))
            .cloned())
    }

    async fn put_cached_request(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
        result: serde_json::Value,
    ) -> Result<(), PonderError> {
        self.rpc_cache
            .lock()
            .unwrap()
            .insert((chain_id, block_number, request.to_string()), result);
        Ok(())
    }
}
