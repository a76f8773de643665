//! EVM RPC client trait and a fetcher that drives every call through a
//! `ponder_rpc::RequestQueue` (rate limit + retry + concurrency cap).

use std::sync::Arc;

use async_trait::async_trait;

use ponder_core::schema::LogFilter;
use ponder_core::types::{BlockHeader, LogSummary, ReceiptSummary, TransactionSummary};
use ponder_rpc::{split_log_range, RequestQueue, RpcError};

/// What a JSON-RPC transport must provide. Parsing the wire format (hex
/// quantities, nested block/transaction JSON) into these already-typed
/// rows is the transport's job, not the fetcher's.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, RpcError>;
    async fn get_block_number(&self) -> Result<u64, RpcError>;
    async fn get_block_by_number(
        &self,
        number: u64,
    ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError>;
    async fn get_block_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError>;
    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptSummary>, RpcError>;
    async fn get_logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<LogSummary>, RpcError>;
    async fn call(&self, to: &str, data: &str, block_number: Option<u64>) -> Result<String, RpcError>;
}

/// Wraps an `EvmRpcClient`, adding range batching for `eth_getLogs` and
/// routing every call through a shared `RequestQueue`.
pub struct EvmFetcher<C> {
    client: C,
    queue: Arc<RequestQueue>,
    max_log_range: u64,
}

impl<C: EvmRpcClient> EvmFetcher<C> {
    pub fn new(client: C, queue: Arc<RequestQueue>, max_log_range: u64) -> Self {
        Self { client, queue, max_log_range }
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        self.queue.dispatch(|| self.client.chain_id()).await
    }

    pub async fn head_block_number(&self) -> Result<u64, RpcError> {
        self.queue.dispatch(|| self.client.get_block_number()).await
    }

    pub async fn block_by_number(
        &self,
        number: u64,
    ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError> {
        self.queue.dispatch(|| self.client.get_block_by_number(number)).await
    }

    pub async fn block_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<(BlockHeader, Vec<TransactionSummary>)>, RpcError> {
        self.queue.dispatch(|| self.client.get_block_by_hash(hash)).await
    }

    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptSummary>, RpcError> {
        self.queue.dispatch(|| self.client.get_transaction_receipt(tx_hash)).await
    }

    pub async fn call(&self, to: &str, data: &str, block_number: Option<u64>) -> Result<String, RpcError> {
        self.queue.dispatch(|| self.client.call(to, data, block_number)).await
    }

    /// Fetch all logs in `[from, to]`, splitting into `max_log_range`-sized
    /// chunks and dispatching each through the request queue independently.
    pub async fn logs(&self, from: u64, to: u64, filter: &LogFilter) -> Result<Vec<LogSummary>, RpcError> {
        let mut all = Vec::new();
        for (start, end) in split_log_range(from, to, self.max_log_range) {
            let chunk = self.queue.dispatch(|| self.client.get_logs(start, end, filter)).await?;
            all.extend(chunk);
        }
        Ok(all)
    }
}

/// Parse a hex-encoded string (with or without `0x`) to u64. Kept as a
/// standalone helper for `EvmRpcClient` implementors parsing JSON-RPC
/// quantity fields.
pub fn parse_hex_u64(s: &str) -> u64 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).unwrap_or(0)
}
