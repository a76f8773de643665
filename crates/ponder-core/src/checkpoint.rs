//! Checkpoint algebra — the totally ordered position used as the global
//! clock across every chain the engine indexes.
//!
//! A checkpoint is the tuple `(blockTimestamp, chainId, blockNumber,
//! transactionIndex, eventIndex)` compared lexicographically. `encode`
//! produces a fixed-width, byte-lexicographically sortable string so
//! that `decode(encode(c)) == c` and `a < b` in the tuple order iff
//! `encode(a) < encode(b)` as plain strings — this lets a checkpoint be
//! used directly as a SQL/B-tree sort key without decoding it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PonderError;

/// Width, in decimal digits, of each encoded field. u64 maxes out at 20
/// digits; we use the same width for every numeric field for simplicity
/// and because none of them plausibly exceeds it.
const FIELD_WIDTH: usize = 20;
const ENCODED_LEN: usize = FIELD_WIDTH * 5;

/// A totally ordered position in multi-chain history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint {
    pub block_timestamp: u64,
    pub chain_id: u64,
    pub block_number: u64,
    pub transaction_index: u64,
    pub event_index: u64,
}

impl Checkpoint {
    /// The smallest possible checkpoint (all components zero).
    pub const ZERO: Checkpoint = Checkpoint {
        block_timestamp: 0,
        chain_id: 0,
        block_number: 0,
        transaction_index: 0,
        event_index: 0,
    };

    /// The largest possible checkpoint (all components at `u64::MAX`).
    pub const MAX: Checkpoint = Checkpoint {
        block_timestamp: u64::MAX,
        chain_id: u64::MAX,
        block_number: u64::MAX,
        transaction_index: u64::MAX,
        event_index: u64::MAX,
    };

    pub fn new(
        block_timestamp: u64,
        chain_id: u64,
        block_number: u64,
        transaction_index: u64,
        event_index: u64,
    ) -> Self {
        Self {
            block_timestamp,
            chain_id,
            block_number,
            transaction_index,
            event_index,
        }
    }

    /// Encode as a fixed-width, lexicographically sortable string.
    pub fn encode(&self) -> String {
        format!(
            "{:0w$}{:0w$}{:0w$}{:0w$}{:0w$}",
            self.block_timestamp,
            self.chain_id,
            self.block_number,
            self.transaction_index,
            self.event_index,
            w = FIELD_WIDTH,
        )
    }

    /// Decode a string produced by [`Checkpoint::encode`].
    pub fn decode(s: &str) -> Result<Checkpoint, PonderError> {
        if s.len() != ENCODED_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PonderError::Other(format!(
                "invalid checkpoint encoding: {s:?}"
            )));
        }
        let field = |i: usize| -> Result<u64, PonderError> {
            let start = i * FIELD_WIDTH;
            s[start..start + FIELD_WIDTH]
                .parse::<u64>()
                .map_err(|e| PonderError::Other(format!("invalid checkpoint field: {e}")))
        };
        Ok(Checkpoint {
            block_timestamp: field(0)?,
            chain_id: field(1)?,
            block_number: field(2)?,
            transaction_index: field(3)?,
            event_index: field(4)?,
        })
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

// ─── Crash-recovery checkpoint store ──────────────────────────────────────────
//
// Distinct from the `Checkpoint` algebra above: this is the persisted
// "where did we last leave off" position per (chain, indexer) pair, used
// to resume after a process restart. Kept as its own small subsystem
// because the sync store and the namespace lock both need a place to
// stash a `Checkpoint` without depending on each other.

use async_trait::async_trait;

/// A persisted resume position for one (chain, indexer) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCheckpoint {
    pub chain_id: String,
    pub indexer_id: String,
    pub checkpoint: Checkpoint,
    pub updated_at: i64,
}

/// Trait for storing and loading resume checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<SavedCheckpoint>, PonderError>;

    async fn save(&self, checkpoint: SavedCheckpoint) -> Result<(), PonderError>;

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), PonderError>;
}

/// Manages checkpoint reads/writes for one indexer, saving only every
/// `save_interval` advances to avoid a write per block.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    chain_id: String,
    indexer_id: String,
    save_interval: u64,
    counter: u64,
}

impl CheckpointManager {
    pub fn new(
        store: Box<dyn CheckpointStore>,
        chain_id: impl Into<String>,
        indexer_id: impl Into<String>,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            chain_id: chain_id.into(),
            indexer_id: indexer_id.into(),
            save_interval,
            counter: 0,
        }
    }

    pub async fn load(&self) -> Result<Option<SavedCheckpoint>, PonderError> {
        self.store.load(&self.chain_id, &self.indexer_id).await
    }

    /// Conditionally persist every `save_interval` calls. Call this after
    /// each event/block is successfully processed.
    pub async fn maybe_save(&mut self, checkpoint: Checkpoint) -> Result<(), PonderError> {
        self.counter += 1;
        if self.counter >= self.save_interval {
            self.force_save(checkpoint).await?;
            self.counter = 0;
        }
        Ok(())
    }

    /// Immediately persist (used on shutdown / reorg recovery).
    pub async fn force_save(&self, checkpoint: Checkpoint) -> Result<(), PonderError> {
        let saved = SavedCheckpoint {
            chain_id: self.chain_id.clone(),
            indexer_id: self.indexer_id.clone(),
            checkpoint,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(saved).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, SavedCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(chain_id: &str, indexer_id: &str) -> String {
        format!("{chain_id}:{indexer_id}")
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<SavedCheckpoint>, PonderError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .get(&Self::key(chain_id, indexer_id))
            .cloned())
    }

    async fn save(&self, checkpoint: SavedCheckpoint) -> Result<(), PonderError> {
        let key = Self::key(&checkpoint.chain_id, &checkpoint.indexer_id);
        self.data.lock().unwrap().insert(key, checkpoint);
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), PonderError> {
        self.data.lock().unwrap().remove(&Self::key(chain_id, indexer_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(ts: u64, chain: u64, num: u64, tx: u64, ev: u64) -> Checkpoint {
        Checkpoint::new(ts, chain, num, tx, ev)
    }

    #[test]
    fn round_trip() {
        let c = cp(1_700_000_000, 1, 19_000_000, 3, 7);
        assert_eq!(Checkpoint::decode(&c.encode()).unwrap(), c);
    }

    #[test]
    fn zero_and_max_round_trip() {
        assert_eq!(Checkpoint::decode(&Checkpoint::ZERO.encode()).unwrap(), Checkpoint::ZERO);
        assert_eq!(Checkpoint::decode(&Checkpoint::MAX.encode()).unwrap(), Checkpoint::MAX);
    }

    #[test]
    fn ordering_matches_tuple_order() {
        let a = cp(100, 1, 1, 0, 0);
        let b = cp(100, 1, 2, 0, 0);
        let c = cp(100, 2, 1, 0, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn encoded_order_matches_checkpoint_order() {
        let pairs = [
            (cp(1, 1, 1, 0, 0), cp(1, 1, 1, 0, 1)),
            (cp(1, 1, 1, 0, 0), cp(1, 1, 2, 0, 0)),
            (cp(5, 1, 1, 0, 0), cp(10, 1, 1, 0, 0)),
        ];
        for (a, b) in pairs {
            assert!(a < b);
            assert!(a.encode() < b.encode(), "byte-lex order must match tuple order");
        }
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(Checkpoint::decode("not-a-checkpoint").is_err());
        assert!(Checkpoint::decode("123").is_err());
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = Box::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store, "ethereum", "my-indexer", 10);

        assert!(mgr.load().await.unwrap().is_none());

        mgr.force_save(cp(1000, 1, 1000, 0, 0)).await.unwrap();

        let saved = mgr.load().await.unwrap().unwrap();
        assert_eq!(saved.checkpoint.block_number, 1000);
        assert_eq!(saved.chain_id, "ethereum");
    }

    #[tokio::test]
    async fn checkpoint_save_interval() {
        let store = Box::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store, "ethereum", "idx", 5);

        for i in 1..=4u64 {
            mgr.maybe_save(cp(i, 1, i, 0, 0)).await.unwrap();
        }
        assert!(mgr.load().await.unwrap().is_none());

        mgr.maybe_save(cp(5, 1, 5, 0, 0)).await.unwrap();
        let saved = mgr.load().await.unwrap().unwrap();
        assert_eq!(saved.checkpoint.block_number, 5);
    }
}
