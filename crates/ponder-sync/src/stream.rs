//! Event stream: merges per-network `SyncStore::get_log_events` cursors
//! into one checkpoint-ordered stream, batched and bounded by how far
//! each network has safely synced.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_storage::sync::{LogEvent, LogEventQuery, SyncStore};

/// One network feeding the merged stream. `safe_checkpoint` is re-invoked
/// on every batch and should reflect the caller's current finalized/synced
/// watermark for this network (e.g. from `RealtimeTick::finalized_block`).
pub struct NetworkSource {
    pub chain_id: u64,
    pub store: Arc<dyn SyncStore>,
    pub safe_checkpoint: Arc<dyn Fn() -> Checkpoint + Send + Sync>,
}

#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<LogEvent>,
    pub high_watermark: Checkpoint,
}

struct StreamState {
    sources: Vec<NetworkSource>,
    cursor: Checkpoint,
    batch_window: usize,
    idle_poll_interval: Duration,
}

/// A lazy, checkpoint-ordered merge of every source's log events, starting
/// strictly after `start`. Never terminates on its own; restartable from
/// any checkpoint by constructing a new stream with that checkpoint.
pub fn event_stream(
    sources: Vec<NetworkSource>,
    start: Checkpoint,
    batch_window: usize,
    idle_poll_interval: Duration,
) -> impl Stream<Item = Result<EventBatch, PonderError>> {
    let state = StreamState { sources, cursor: start, batch_window, idle_poll_interval };
    stream::unfold(state, |mut state| async move {
        loop {
            match fetch_batch(&state).await {
                Ok(Some(batch)) => {
                    state.cursor = batch.high_watermark;
                    return Some((Ok(batch), state));
                }
                Ok(None) => {
                    tokio::time::sleep(state.idle_poll_interval).await;
                    continue;
                }
                Err(e) => return Some((Err(e), state)),
            }
        }
    })
}

/// Query every source for events in `(cursor, safe_checkpoint]`, k-way
/// merge by checkpoint, and cap at `batch_window`. Returns `None` when no
/// source has anything new.
async fn fetch_batch(state: &StreamState) -> Result<Option<EventBatch>, PonderError> {
    let mut merged: Vec<LogEvent> = Vec::new();

    for source in &state.sources {
        let safe = (source.safe_checkpoint)();
        if safe <= state.cursor {
            continue;
        }
        let events = source
            .store
            .get_log_events(LogEventQuery {
                from_checkpoint: Some(state.cursor),
                to_checkpoint: Some(safe),
                chain_id: Some(source.chain_id),
                limit: Some(state.batch_window),
            })
            .await?;
        merged.extend(events.into_iter().filter(|e| e.checkpoint > state.cursor));
    }

    if merged.is_empty() {
        return Ok(None);
    }

    merged.sort_by_key(|e| e.checkpoint);
    merged.truncate(state.batch_window);
    let high_watermark = merged.last().map(|e| e.checkpoint).unwrap_or(state.cursor);

    Ok(Some(EventBatch { events: merged, high_watermark }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use ponder_core::types::{BlockHeader, LogSummary, TransactionSummary};
    use ponder_storage::sync::MemorySyncStore;

    fn header(chain_id: u64, number: u64) -> BlockHeader {
        BlockHeader {
            chain_id,
            number,
            hash: format!("0xb{number}"),
            parent_hash: format!("0xb{}", number.wrapping_sub(1)),
            timestamp: number * 12,
            miner: "0x0".into(),
            gas_limit: "30000000".into(),
            gas_used: "0".into(),
            base_fee_per_gas: None,
            state_root: "0x0".into(),
            transactions_root: "0x0".into(),
            receipts_root: "0x0".into(),
            logs_bloom: "0x0".into(),
            extra_data: "0x".into(),
            mix_hash: "0x0".into(),
            nonce: "0x0".into(),
            difficulty: "0".into(),
            size: None,
        }
    }

    fn tx(chain_id: u64, block_number: u64) -> TransactionSummary {
        TransactionSummary {
            chain_id,
            hash: format!("0xt{block_number}"),
            block_hash: format!("0xb{block_number}"),
            block_number,
            transaction_index: 0,
            from: "0xfrom".into(),
            to: Some("0xto".into()),
            value: "0".into(),
            input: "0x".into(),
            nonce: 0,
            gas: "21000".into(),
            gas_price: Some("1".into()),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            transaction_type: 0,
        }
    }

    fn log(chain_id: u64, block_number: u64) -> LogSummary {
        LogSummary {
            chain_id,
            address: "0xc".into(),
            topics: vec!["0xt0".into()],
            data: "0x".into(),
            block_hash: format!("0xb{block_number}"),
            block_number,
            transaction_hash: format!("0xt{block_number}"),
            transaction_index: 0,
            log_index: 0,
            removed: false,
        }
    }

    #[tokio::test]
    async fn merges_two_networks_in_checkpoint_order() {
        let store_a = Arc::new(MemorySyncStore::default());
        let store_b = Arc::new(MemorySyncStore::default());

        store_a.insert_blocks(&[header(1, 10)]).await.unwrap();
        store_a.insert_transactions(&[tx(1, 10)]).await.unwrap();
        store_a.insert_logs(&[(log(1, 10), Checkpoint::new(100, 1, 10, 0, 0))]).await.unwrap();

        store_b.insert_blocks(&[header(2, 5)]).await.unwrap();
        store_b.insert_transactions(&[tx(2, 5)]).await.unwrap();
        store_b.insert_logs(&[(log(2, 5), Checkpoint::new(50, 2, 5, 0, 0))]).await.unwrap();

        let sources = vec![
            NetworkSource { chain_id: 1, store: store_a.clone(), safe_checkpoint: Arc::new(|| Checkpoint::MAX) },
            NetworkSource { chain_id: 2, store: store_b.clone(), safe_checkpoint: Arc::new(|| Checkpoint::MAX) },
        ];

        let mut s = Box::pin(event_stream(sources, Checkpoint::ZERO, 10, Duration::from_millis(1)));
        let batch = s.next().await.unwrap().unwrap();
        assert_eq!(batch.events.len(), 2);
        assert!(batch.events[0].checkpoint < batch.events[1].checkpoint);
        assert_eq!(batch.events[0].checkpoint.chain_id, 2);
    }
}
