//! Config surface recognized by the core — the shapes a host's config
//! file is expected to deserialize into before constructing the engine.
//!
//! None of the loading (file parsing, env var interpolation, watching)
//! lives here; that's an external collaborator's job. This module only
//! defines what a valid config looks like once loaded.

use serde::{Deserialize, Serialize};

/// One chain to index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub transport: String,
    #[serde(default)]
    pub polling_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_requests_per_second: Option<u32>,
    #[serde(default)]
    pub max_concurrent_requests: Option<u32>,
}

impl NetworkConfig {
    pub fn polling_interval_ms(&self) -> u64 {
        self.polling_interval_ms.unwrap_or(1_000)
    }

    pub fn max_requests_per_second(&self) -> u32 {
        self.max_requests_per_second.unwrap_or(50)
    }

    pub fn max_concurrent_requests(&self) -> u32 {
        self.max_concurrent_requests.unwrap_or(10)
    }
}

/// Where a contract's address set comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressSource {
    Static(Vec<String>),
    Factory {
        address: String,
        event: String,
        parameter: String,
    },
}

/// One contract to index events/calls from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub name: String,
    pub network: String,
    /// ABI is supplied externally; the core only needs the event names it
    /// references, not the ABI itself.
    pub abi_event_names: Vec<String>,
    pub address: AddressSource,
    pub start_block: u64,
    #[serde(default)]
    pub end_block: Option<u64>,
    #[serde(default)]
    pub include_transaction_receipts: bool,
}

/// Which storage backend and namespace to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub kind: DatabaseKind,
    /// SQLite: file path/directory. Postgres: connection string.
    pub connection: String,
    #[serde(default)]
    pub user_namespace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
}

/// Tunable engine options with spec-mandated defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub max_block_range: Option<u64>,
    #[serde(default)]
    pub finality_block_count: Option<u64>,
    #[serde(default)]
    pub lease_ttl_ms: Option<u64>,
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

impl Options {
    pub fn max_block_range(&self) -> u64 {
        self.max_block_range.unwrap_or(10_000)
    }

    pub fn finality_block_count(&self) -> u64 {
        self.finality_block_count.unwrap_or(12)
    }

    pub fn lease_ttl_ms(&self) -> u64 {
        self.lease_ttl_ms.unwrap_or(60_000)
    }

    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval_ms.unwrap_or(10_000)
    }

    pub fn max_concurrency(&self) -> u32 {
        self.max_concurrency.unwrap_or(10)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_block_range: None,
            finality_block_count: None,
            lease_ttl_ms: None,
            heartbeat_interval_ms: None,
            max_concurrency: None,
        }
    }
}

/// Top-level config the host loads and hands to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub networks: Vec<NetworkConfig>,
    pub contracts: Vec<ContractConfig>,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub options: Options,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_apply_spec_defaults() {
        let opts = Options::default();
        assert_eq!(opts.max_block_range(), 10_000);
        assert_eq!(opts.finality_block_count(), 12);
        assert_eq!(opts.lease_ttl_ms(), 60_000);
        assert_eq!(opts.heartbeat_interval_ms(), 10_000);
        assert_eq!(opts.max_concurrency(), 10);
    }

    #[test]
    fn options_override_defaults() {
        let opts = Options {
            max_block_range: Some(500),
            ..Options::default()
        };
        assert_eq!(opts.max_block_range(), 500);
        assert_eq!(opts.finality_block_count(), 12);
    }

    #[test]
    fn network_config_defaults() {
        let net = NetworkConfig {
            name: "mainnet".into(),
            chain_id: 1,
            transport: "https://rpc.example".into(),
            polling_interval_ms: None,
            max_requests_per_second: None,
            max_concurrent_requests: None,
        };
        assert_eq!(net.polling_interval_ms(), 1_000);
        assert_eq!(net.max_requests_per_second(), 50);
    }
}
