//! Filter metadata describing which logs a contract subscription cares
//! about — static address sets (`LogFilter`) and factory-derived address
//! sets (`FactoryFilter`).

use serde::{Deserialize, Serialize};

/// Where in a factory-creation event the child contract address lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildAddressLocation {
    Topic1,
    Topic2,
    Topic3,
    Offset(u32),
}

/// A static, address-pinned log filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFilter {
    pub chain_id: u64,
    pub address: Option<String>,
    pub topics: [Option<String>; 4],
    pub include_transaction_receipts: bool,
}

impl LogFilter {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            address: None,
            topics: [None, None, None, None],
            include_transaction_receipts: false,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_topic0(mut self, topic0: impl Into<String>) -> Self {
        self.topics[0] = Some(topic0.into());
        self
    }

    pub fn matches_address(&self, address: &str) -> bool {
        self.address
            .as_deref()
            .map(|a| a.eq_ignore_ascii_case(address))
            .unwrap_or(true)
    }

    pub fn matches_topics(&self, log_topics: &[String]) -> bool {
        self.topics.iter().enumerate().all(|(i, expected)| match expected {
            None => true,
            Some(t) => log_topics.get(i).map(|lt| lt.eq_ignore_ascii_case(t)).unwrap_or(false),
        })
    }
}

/// A factory-derived log filter — the address set is whatever children the
/// factory's own creation event has emitted up to the scanned block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryFilter {
    pub chain_id: u64,
    pub factory_address: String,
    pub event_selector: String,
    pub child_address_location: ChildAddressLocation,
    pub topics: [Option<String>; 4],
    pub include_transaction_receipts: bool,
}

impl ChildAddressLocation {
    /// Pull the child contract address out of a factory creation log's
    /// topics or, for `Offset`, the right-aligned 20 bytes of the
    /// 32-byte word at that byte offset into `data`.
    pub fn extract(&self, topics: &[String], data: &str) -> Option<String> {
        match self {
            ChildAddressLocation::Topic1 => topics.get(1).cloned(),
            ChildAddressLocation::Topic2 => topics.get(2).cloned(),
            ChildAddressLocation::Topic3 => topics.get(3).cloned(),
            ChildAddressLocation::Offset(offset) => {
                let hex_body = data.strip_prefix("0x").unwrap_or(data);
                let bytes = decode_hex(hex_body)?;
                let start = *offset as usize;
                let word = bytes.get(start..start + 32)?;
                Some(format!("0x{}", encode_hex(&word[12..])))
            }
        }
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl FactoryFilter {
    pub fn new(
        chain_id: u64,
        factory_address: impl Into<String>,
        event_selector: impl Into<String>,
        child_address_location: ChildAddressLocation,
    ) -> Self {
        Self {
            chain_id,
            factory_address: factory_address.into(),
            event_selector: event_selector.into(),
            child_address_location,
            topics: [None, None, None, None],
            include_transaction_receipts: false,
        }
    }
}
