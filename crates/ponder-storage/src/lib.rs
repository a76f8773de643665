//! ponder-storage — pluggable persistence for the raw chain data, the
//! typed indexing tables, and the namespace lock that guards them.
//!
//! Backends:
//! - [`sync::memory`], [`lock::MemoryLockStore`], [`indexing::memory`] — in-memory, dev/testing
//! - [`sync::sqlite`], [`lock::sqlite`], [`indexing::sqlite`] — SQLite via `sqlx`
//! - [`sync::postgres`] — PostgreSQL via `sqlx` (production, high-throughput)

pub mod indexing;
pub mod lock;
pub mod sync;

pub use indexing::{IndexingStore, MemoryIndexingStore};
#[cfg(feature = "sqlite")]
pub use indexing::SqliteIndexingStore;

pub use lock::{LockStore, LockRow, MemoryLockStore};
#[cfg(feature = "sqlite")]
pub use lock::sqlite::SqliteLockStore;

pub use sync::{Interval, LogEvent, LogEventQuery, SyncStore, merge_intervals};
pub use sync::memory::MemorySyncStore;
#[cfg(feature = "sqlite")]
pub use sync::sqlite::SqliteSyncStore;
#[cfg(feature = "postgres")]
pub use sync::postgres::PostgresSyncStore;
