//! Indexing store: typed user-schema rows, physically partitioned by
//! table name (the caller supplies the already-hashed physical table
//! name; see `ponder-db::buildid` for how that name is derived).

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;

pub use memory::MemoryIndexingStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndexingStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub data: serde_json::Value,
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone, Default)]
pub struct FindManyQuery {
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Row>,
    pub page_info: PageInfo,
}

#[async_trait]
pub trait IndexingStore: Send + Sync {
    async fn create(&self, table: &str, row: Row) -> Result<(), PonderError>;
    async fn create_many(&self, table: &str, rows: Vec<Row>) -> Result<(), PonderError>;
    async fn update(&self, table: &str, id: &str, data: serde_json::Value, checkpoint: Checkpoint) -> Result<(), PonderError>;
    async fn upsert(&self, table: &str, row: Row) -> Result<(), PonderError>;
    async fn delete(&self, table: &str, id: &str) -> Result<bool, PonderError>;
    async fn find_unique(&self, table: &str, id: &str) -> Result<Option<Row>, PonderError>;
    async fn find_many(&self, table: &str, query: FindManyQuery) -> Result<Page, PonderError>;

    /// Undo every write strictly above `to_checkpoint` across all tables.
    async fn revert(&self, to_checkpoint: Checkpoint) -> Result<(), PonderError>;
}
