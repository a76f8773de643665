//! Raw chain data row types — the shapes stored in the sync store before
//! any user schema is applied.

use serde::{Deserialize, Serialize};

// ─── BlockHeader ───────────────────────────────────────────────────────────

/// A block header as returned by `eth_getBlockByNumber`, trimmed to the
/// fields the engine actually persists and reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: u64,
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: u64,
    pub miner: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub base_fee_per_gas: Option<String>,
    pub state_root: String,
    pub transactions_root: String,
    pub receipts_root: String,
    pub logs_bloom: String,
    pub extra_data: String,
    pub mix_hash: String,
    pub nonce: String,
    pub difficulty: String,
    pub size: Option<String>,
}

impl BlockHeader {
    /// Returns `true` if `self` is the direct child of `parent`
    /// (same chain, consecutive number, matching parent hash).
    pub fn extends(&self, parent: &BlockHeader) -> bool {
        self.chain_id == parent.chain_id
            && self.number == parent.number + 1
            && self.parent_hash == parent.hash
    }
}

// ─── TransactionSummary ────────────────────────────────────────────────────

/// An EIP-1559-aware transaction as returned by
/// `eth_getBlockByNumber(..., true)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub chain_id: u64,
    pub hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    pub input: String,
    pub nonce: u64,
    pub gas: String,
    pub gas_price: Option<String>,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    pub transaction_type: u64,
}

// ─── ReceiptSummary ─────────────────────────────────────────────────────────

/// A transaction receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub chain_id: u64,
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from: String,
    pub to: Option<String>,
    pub contract_address: Option<String>,
    pub status: u64,
    pub gas_used: String,
    pub cumulative_gas_used: String,
    pub effective_gas_price: Option<String>,
    pub logs_bloom: String,
    pub logs: Vec<LogSummary>,
}

// ─── LogSummary ─────────────────────────────────────────────────────────────

/// A decoded-or-not event log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub chain_id: u64,
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_hash: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub transaction_index: u64,
    pub log_index: u64,
    pub removed: bool,
}

impl LogSummary {
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, hash: &str, parent_hash: &str) -> BlockHeader {
        BlockHeader {
            chain_id: 1,
            number,
            hash: hash.into(),
            parent_hash: parent_hash.into(),
            timestamp: number * 12,
            miner: "0xminer".into(),
            gas_limit: "30000000".into(),
            gas_used: "21000".into(),
            base_fee_per_gas: Some("1000000000".into()),
            state_root: "0xstate".into(),
            transactions_root: "0xtx".into(),
            receipts_root: "0xreceipts".into(),
            logs_bloom: "0x0".into(),
            extra_data: "0x".into(),
            mix_hash: "0xmix".into(),
            nonce: "0x0".into(),
            difficulty: "0".into(),
            size: None,
        }
    }

    #[test]
    fn block_extends_parent() {
        let parent = header(100, "0xaaa", "0x000");
        let child = header(101, "0xbbb", "0xaaa");
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }

    #[test]
    fn block_extends_false_on_gap() {
        let a = header(100, "0xaaa", "0x000");
        let b = header(102, "0xccc", "0xaaa"); // gap
        assert!(!b.extends(&a));
    }

    #[test]
    fn block_extends_false_on_different_chain() {
        let a = header(100, "0xaaa", "0x000");
        let mut b = header(101, "0xbbb", "0xaaa");
        b.chain_id = 2;
        assert!(!b.extends(&a));
    }

    #[test]
    fn log_topic0() {
        let log = LogSummary {
            chain_id: 1,
            address: "0xc".into(),
            topics: vec!["0xt0".into(), "0xt1".into()],
            data: "0x".into(),
            block_hash: "0xb".into(),
            block_number: 1,
            transaction_hash: "0xtx".into(),
            transaction_index: 0,
            log_index: 0,
            removed: false,
        };
        assert_eq!(log.topic0(), Some("0xt0"));
    }
}
