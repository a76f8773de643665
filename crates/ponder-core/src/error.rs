//! Error taxonomy for the Ponder indexing engine.
//!
//! Every variant maps to one row of the propagation policy table in the
//! spec's error-handling design: transient RPC errors are retried and
//! never surface here, reorgs are recovered internally, and everything
//! else either requests a reload (`is_reloadable`) or is fatal
//! (`is_fatal`). Nothing is silently dropped.

use thiserror::Error;

/// Errors that can occur anywhere in the indexing pipeline.
#[derive(Debug, Error)]
pub enum PonderError {
    /// Non-retryable RPC failure (bad params, reverted call, exhausted
    /// retry budget). Distinct from the retryable kind handled entirely
    /// inside `ponder-rpc`.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The sync or indexing store backend failed (connection lost,
    /// constraint violation, serialization error).
    #[error("storage error: {0}")]
    Storage(String),

    /// A user handler threw while processing an event.
    #[error("handler '{handler}' failed: {reason}")]
    UserHandler { handler: String, reason: String },

    /// A write did not conform to the user schema (wrong type, missing
    /// required column, unknown enum value).
    #[error("schema violation in table '{table}': {reason}")]
    SchemaViolation { table: String, reason: String },

    /// A chain reorganization was detected. Recovered internally by the
    /// realtime sync layer (prune + replay); surfaced here only for
    /// logging/metrics hooks.
    #[error("reorg detected at block {block_number}: expected hash {expected}, got {actual}")]
    ReorgDetected {
        block_number: u64,
        expected: String,
        actual: String,
    },

    /// The checkpoint persisted for a chain does not match any block the
    /// node currently reports at that height.
    #[error("checkpoint mismatch at block {block_number}")]
    CheckpointMismatch { block_number: u64 },

    /// Another live writer already holds the namespace lock.
    #[error("namespace '{namespace}' is locked (expires in {ms_until_expiry}ms)")]
    NamespaceLocked {
        namespace: String,
        ms_until_expiry: u64,
    },

    /// The namespace lock is held by a different, incompatible build and
    /// no safe migration path (cache reuse or fresh tables) applies.
    #[error(
        "build ID conflict for namespace '{namespace}': locked={locked_build_id}, requested={requested_build_id}"
    )]
    BuildIdConflict {
        namespace: String,
        locked_build_id: String,
        requested_build_id: String,
    },

    /// The underlying database is unreachable or corrupted.
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// The indexer was asked to stop (`kill()`) while an operation was
    /// in flight.
    #[error("aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

/// Where the sync loop is when an error occurs. `Rpc` errors (permanent
/// RPC failures and malformed chain responses) are classified
/// differently depending on this: fatal before the engine has ever
/// reached the chain head, reloadable once it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Startup,
    SteadyState,
}

impl PonderError {
    /// `true` for reorgs — recovered internally, never surfaced to a host
    /// as reload/fatal.
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::ReorgDetected { .. })
    }

    /// `true` if the host should request a code-edit hot reload
    /// (`onReloadableError`): user handler errors always qualify, and a
    /// permanent RPC/chain-response failure qualifies once steady state
    /// has been reached (a code fix is plausible; the engine has already
    /// proven it can sync this chain).
    pub fn is_reloadable(&self, phase: SyncPhase) -> bool {
        matches!(self, Self::UserHandler { .. })
            || (matches!(self, Self::Rpc(_)) && phase == SyncPhase::SteadyState)
    }

    /// `true` if the host should exit the process (`onFatalError`):
    /// schema violations, lock/build conflicts, and database failures
    /// all indicate state a reload cannot fix, as does a permanent
    /// RPC/chain-response failure encountered before startup ever
    /// reached the chain head.
    pub fn is_fatal(&self, phase: SyncPhase) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. }
                | Self::NamespaceLocked { .. }
                | Self::BuildIdConflict { .. }
                | Self::DatabaseUnavailable(_)
        ) || (matches!(self, Self::Rpc(_)) && phase == SyncPhase::Startup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_user_handler_as_reloadable_regardless_of_phase() {
        let e = PonderError::UserHandler {
            handler: "Transfer".into(),
            reason: "boom".into(),
        };
        assert!(e.is_reloadable(SyncPhase::Startup));
        assert!(e.is_reloadable(SyncPhase::SteadyState));
        assert!(!e.is_fatal(SyncPhase::Startup));
        assert!(!e.is_fatal(SyncPhase::SteadyState));
    }

    #[test]
    fn classifies_schema_violation_as_fatal_regardless_of_phase() {
        let e = PonderError::SchemaViolation {
            table: "Pet".into(),
            reason: "missing id".into(),
        };
        assert!(e.is_fatal(SyncPhase::Startup));
        assert!(e.is_fatal(SyncPhase::SteadyState));
        assert!(!e.is_reloadable(SyncPhase::Startup));
        assert!(!e.is_reloadable(SyncPhase::SteadyState));
    }

    #[test]
    fn classifies_reorg_as_neither() {
        let e = PonderError::ReorgDetected {
            block_number: 100,
            expected: "0xa".into(),
            actual: "0xb".into(),
        };
        assert!(e.is_reorg());
        assert!(!e.is_fatal(SyncPhase::Startup));
        assert!(!e.is_reloadable(SyncPhase::SteadyState));
    }

    #[test]
    fn classifies_permanent_rpc_error_as_fatal_at_startup() {
        let e = PonderError::Rpc("bad response".into());
        assert!(e.is_fatal(SyncPhase::Startup));
        assert!(!e.is_reloadable(SyncPhase::Startup));
    }

    #[test]
    fn classifies_permanent_rpc_error_as_reloadable_in_steady_state() {
        let e = PonderError::Rpc("bad response".into());
        assert!(e.is_reloadable(SyncPhase::SteadyState));
        assert!(!e.is_fatal(SyncPhase::SteadyState));
    }
}
