//! ponder-core — foundation for the reorg-safe, embeddable indexing engine.
//!
//! # Architecture
//!
//! ```text
//! EngineConfig → Checkpoint / Schema / DependencyGraph
//!                      ├── BlockTracker     (head tracking, parent hash chain)
//!                      ├── ReorgDetector    (4 reorg scenarios)
//!                      ├── CheckpointManager (crash recovery)
//!                      ├── HandlerRegistry  (user event/block handlers)
//!                      └── Common           (options/logger/metrics/telemetry)
//! ```

pub mod bigint;
pub mod checkpoint;
pub mod common;
pub mod config;
pub mod dag;
pub mod error;
pub mod handler;
pub mod reorg;
pub mod schema;
pub mod tracker;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore, SavedCheckpoint};
pub use common::Common;
pub use config::{ContractConfig, DatabaseConfig, EngineConfig, NetworkConfig, Options};
pub use dag::{DependencyGraph, HandlerSpec, StoreMethod};
pub use error::{PonderError, SyncPhase};
pub use handler::{BlockHandler, DecodedLog, EventHandler, HandlerRegistry, ReorgHandler};
pub use reorg::{ReorgDetector, ReorgEvent, ReorgType};
pub use schema::{ChildAddressLocation, Column, ColumnType, EnumDef, FactoryFilter, LogFilter, Scalar, Schema, Table};
pub use tracker::{BlockInfo, BlockTracker};
pub use types::{BlockHeader, LogSummary, ReceiptSummary, TransactionSummary};
