//! RPC-level error classification. Distinct from `ponder_core::PonderError`:
//! this is the transport's view (retryable or not), wrapped into
//! `PonderError::Rpc` once it crosses into the engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection refused, timeout, rate limited — worth retrying.
    #[error("transient RPC failure: {0}")]
    Transient(String),

    /// Malformed request, unsupported method, node rejected params outright.
    #[error("permanent RPC failure: {0}")]
    Permanent(String),

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("transaction receipt not found: {0}")]
    TransactionReceiptNotFound(String),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl RpcError {
    /// `true` if retrying the same request has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        assert!(RpcError::Transient("timeout".into()).is_retryable());
    }

    #[test]
    fn permanent_is_not_retryable() {
        assert!(!RpcError::Permanent("bad params".into()).is_retryable());
    }

    #[test]
    fn not_found_errors_are_not_retryable() {
        assert!(!RpcError::BlockNotFound("0x1".into()).is_retryable());
        assert!(!RpcError::TransactionReceiptNotFound("0xabc".into()).is_retryable());
    }
}
