//! The concrete handler context: the typed store, a memoized read-only
//! contract client, network identity, and contract address bindings.

use std::collections::HashMap;
use std::sync::Arc;

use ponder_core::error::PonderError;
use ponder_storage::sync::SyncStore;

use crate::store::TypedStore;

/// Minimal network identity surfaced to handlers.
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub name: String,
}

/// Anything that can answer a memoizable `eth_call` at a fixed block —
/// satisfied by `ponder_sync::fetcher::EvmFetcher<C>` in the engine, kept
/// as a trait here so this crate doesn't need to depend on `ponder-sync`
/// for a single method.
#[async_trait::async_trait]
pub trait CallClient: Send + Sync {
    async fn call(&self, to: &str, data: &str, block_number: u64) -> Result<String, PonderError>;
}

/// Read-only contract views backed by `eth_call`, memoized per
/// `(chain_id, block_number, request)` in the sync store's request
/// cache so repeated handler calls against the same block never hit the
/// node twice.
pub struct ReadOnlyClient<T: CallClient> {
    inner: Arc<T>,
    sync_store: Arc<dyn SyncStore>,
    chain_id: u64,
}

impl<T: CallClient> ReadOnlyClient<T> {
    pub fn new(inner: Arc<T>, sync_store: Arc<dyn SyncStore>, chain_id: u64) -> Self {
        Self { inner, sync_store, chain_id }
    }

    /// Memoized `eth_call`. The cache key is the raw calldata; decoding
    /// the returned hex string into typed values is the generated
    /// contract binding's job, not this client's.
    pub async fn call(&self, to: &str, data: &str, block_number: u64) -> Result<String, PonderError> {
        let key = format!("eth_call:{to}:{data}");
        if let Some(cached) = self.sync_store.get_cached_request(self.chain_id, block_number, &key).await? {
            if let Some(s) = cached.as_str() {
                return Ok(s.to_string());
            }
        }
        let result = self.inner.call(to, data, block_number).await?;
        self.sync_store
            .put_cached_request(self.chain_id, block_number, &key, serde_json::Value::String(result.clone()))
            .await?;
        Ok(result)
    }
}

/// Context handed to every handler invocation: `db` for indexing-store
/// access, `client` for read-only contract views, `network` for chain
/// identity, and `contracts` for address bindings (typed ABI bindings
/// are generated externally; this only carries the address each name
/// resolves to on this network).
pub struct IndexContext<T: CallClient> {
    pub db: Arc<TypedStore>,
    pub client: ReadOnlyClient<T>,
    pub network: NetworkInfo,
    pub contracts: HashMap<String, String>,
}

impl<T: CallClient> IndexContext<T> {
    pub fn new(db: Arc<TypedStore>, client: ReadOnlyClient<T>, network: NetworkInfo, contracts: HashMap<String, String>) -> Self {
        Self { db, client, network, contracts }
    }

    pub fn contract_address(&self, name: &str) -> Option<&str> {
        self.contracts.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ponder_core::schema::{Column, ColumnType, Scalar, Schema, Table};
    use ponder_storage::indexing::MemoryIndexingStore;
    use ponder_storage::sync::MemorySyncStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeClient(AtomicU32);

    #[async_trait::async_trait]
    impl CallClient for FakeClient {
        async fn call(&self, _to: &str, _data: &str, _block_number: u64) -> Result<String, PonderError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok("0xdeadbeef".to_string())
        }
    }

    fn schema() -> Schema {
        Schema::new().with_table(Table {
            name: "Pet".into(),
            columns: vec![Column { name: "id".into(), column_type: ColumnType::Scalar(Scalar::String), optional: false, list: false }],
        })
    }

    #[tokio::test]
    async fn repeated_call_at_same_block_hits_inner_client_once() {
        let sync_store: Arc<dyn SyncStore> = Arc::new(MemorySyncStore::default());
        let inner = Arc::new(FakeClient(AtomicU32::new(0)));
        let client = ReadOnlyClient::new(inner.clone(), sync_store, 1);

        let a = client.call("0xabc", "0x1234", 100).await.unwrap();
        let b = client.call("0xabc", "0x1234", 100).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(inner.0.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn call_at_a_different_block_bypasses_the_cache() {
        let sync_store: Arc<dyn SyncStore> = Arc::new(MemorySyncStore::default());
        let inner = Arc::new(FakeClient(AtomicU32::new(0)));
        let client = ReadOnlyClient::new(inner.clone(), sync_store, 1);

        client.call("0xabc", "0x1234", 100).await.unwrap();
        client.call("0xabc", "0x1234", 101).await.unwrap();
        assert_eq!(inner.0.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn context_resolves_contract_addresses() {
        let backend = Arc::new(MemoryIndexingStore::default());
        let db = Arc::new(TypedStore::new(backend, Arc::new(schema())));
        let sync_store: Arc<dyn SyncStore> = Arc::new(MemorySyncStore::default());
        let client = ReadOnlyClient::new(Arc::new(FakeClient(AtomicU32::new(0))), sync_store, 1);
        let mut contracts = HashMap::new();
        contracts.insert("Vault".to_string(), "0xvault".to_string());

        let ctx = IndexContext::new(db, client, NetworkInfo { chain_id: 1, name: "mainnet".into() }, contracts);
        assert_eq!(ctx.contract_address("Vault"), Some("0xvault"));
        assert_eq!(ctx.contract_address("Missing"), None);
    }
}
