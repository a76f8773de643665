//! In-memory indexing store backed by a shadow log: every write records
//! the row's prior value so `revert` can replay history backwards.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;

use super::{FindManyQuery, IndexingStore, Page, PageInfo, Row};

struct WriteLogEntry {
    table: String,
    id: String,
    prior: Option<Row>,
    checkpoint: Checkpoint,
}

#[derive(Default)]
pub struct MemoryIndexingStore {
    tables: Mutex<HashMap<String, HashMap<String, Row>>>,
    log: Mutex<Vec<WriteLogEntry>>,
}

impl MemoryIndexingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, table: &str, id: &str, prior: Option<Row>, checkpoint: Checkpoint) {
        self.log.lock().unwrap().push(WriteLogEntry {
            table: table.to_string(),
            id: id.to_string(),
            prior,
            checkpoint,
        });
    }
}

#[async_trait]
impl IndexingStore for MemoryIndexingStore {
    async fn create(&self, table: &str, row: Row) -> Result<(), PonderError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&row.id) {
            return Err(PonderError::Storage(format!(
                "unique violation: {table}.{}",
                row.id
            )));
        }
        let checkpoint = row.checkpoint;
        let id = row.id.clone();
        rows.insert(id.clone(), row);
        drop(tables);
        self.record(table, &id, None, checkpoint);
        Ok(())
    }

    async fn create_many(&self, table: &str, rows: Vec<Row>) -> Result<(), PonderError> {
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table.to_string()).or_default();
        for row in &rows {
            if existing.contains_key(&row.id) {
                return Err(PonderError::Storage(format!(
                    "unique violation: {table}.{}",
                    row.id
                )));
            }
        }
        let mut recorded = Vec::with_capacity(rows.len());
        for row in rows {
            let checkpoint = row.checkpoint;
            let id = row.id.clone();
            existing.insert(id.clone(), row);
            recorded.push((id, checkpoint));
        }
        drop(tables);
        for (id, checkpoint) in recorded {
            self.record(table, &id, None, checkpoint);
        }
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        data: serde_json::Value,
        checkpoint: Checkpoint,
    ) -> Result<(), PonderError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let prior = rows
            .get(id)
            .cloned()
            .ok_or_else(|| PonderError::Storage(format!("not found: {table}.{id}")))?;
        rows.insert(id.to_string(), Row { id: id.to_string(), data, checkpoint });
        drop(tables);
        self.record(table, id, Some(prior), checkpoint);
        Ok(())
    }

    async fn upsert(&self, table: &str, row: Row) -> Result<(), PonderError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let prior = rows.get(&row.id).cloned();
        let checkpoint = row.checkpoint;
        let id = row.id.clone();
        rows.insert(id.clone(), row);
        drop(tables);
        self.record(table, &id, prior, checkpoint);
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, PonderError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let prior = rows.remove(id);
        let existed = prior.is_some();
        drop(tables);
        if let Some(prior) = prior {
            self.record(table, id, Some(prior.clone()), prior.checkpoint);
        }
        Ok(existed)
    }

    async fn find_unique(&self, table: &str, id: &str) -> Result<Option<Row>, PonderError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn find_many(&self, table: &str, query: FindManyQuery) -> Result<Page, PonderError> {
        let tables = self.tables.lock().unwrap();
        let mut items: Vec<Row> = tables.get(table).map(|r| r.values().cloned().collect()).unwrap_or_default();
        items.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(after) = &query.after {
            items.retain(|r| &r.id > after);
        }
        if let Some(before) = &query.before {
            items.retain(|r| &r.id < before);
        }

        let has_previous_page = query.after.is_some();
        let mut has_next_page = false;
        if let Some(limit) = query.limit {
            if items.len() > limit {
                items.truncate(limit);
                has_next_page = true;
            }
        }

        Ok(Page { items, page_info: PageInfo { has_next_page, has_previous_page } })
    }

    async fn revert(&self, to_checkpoint: Checkpoint) -> Result<(), PonderError> {
        let mut log = self.log.lock().unwrap();
        let mut tables = self.tables.lock().unwrap();
        while let Some(last) = log.last() {
            if last.checkpoint <= to_checkpoint {
                break;
            }
            let entry = log.pop().unwrap();
            let rows = tables.entry(entry.table).or_default();
            match entry.prior {
                Some(prior) => {
                    rows.insert(entry.id, prior);
                }
                None => {
                    rows.remove(&entry.id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, value: i64, checkpoint: Checkpoint) -> Row {
        Row { id: id.into(), data: serde_json::json!({"value": value}), checkpoint }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = MemoryIndexingStore::new();
        store.create("Balance", row("alice", 100, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        let found = store.find_unique("Balance", "alice").await.unwrap().unwrap();
        assert_eq!(found.data["value"], 100);
    }

    #[tokio::test]
    async fn create_duplicate_fails() {
        let store = MemoryIndexingStore::new();
        store.create("Balance", row("alice", 100, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        let result = store.create("Balance", row("alice", 200, Checkpoint::new(2, 1, 2, 0, 0))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn update_missing_fails() {
        let store = MemoryIndexingStore::new();
        let result = store
            .update("Balance", "ghost", serde_json::json!({"value": 1}), Checkpoint::new(1, 1, 1, 0, 0))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_returns_false_when_absent() {
        let store = MemoryIndexingStore::new();
        assert!(!store.delete("Balance", "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn revert_undoes_writes_above_checkpoint() {
        let store = MemoryIndexingStore::new();
        store.create("Balance", row("alice", 100, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        store
            .update("Balance", "alice", serde_json::json!({"value": 200}), Checkpoint::new(2, 1, 2, 0, 0))
            .await
            .unwrap();
        store
            .update("Balance", "alice", serde_json::json!({"value": 300}), Checkpoint::new(3, 1, 3, 0, 0))
            .await
            .unwrap();

        store.revert(Checkpoint::new(1, 1, 1, 0, 0)).await.unwrap();

        let found = store.find_unique("Balance", "alice").await.unwrap().unwrap();
        assert_eq!(found.data["value"], 100);
    }

    #[tokio::test]
    async fn revert_undoes_a_create_entirely() {
        let store = MemoryIndexingStore::new();
        store.create("Balance", row("alice", 100, Checkpoint::new(5, 1, 5, 0, 0))).await.unwrap();
        store.revert(Checkpoint::new(1, 1, 1, 0, 0)).await.unwrap();
        assert!(store.find_unique("Balance", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_many_paginates_with_limit() {
        let store = MemoryIndexingStore::new();
        for i in 0..5 {
            store
                .create("Balance", row(&format!("id{i}"), i, Checkpoint::new(i as u64, 1, i as u64, 0, 0)))
                .await
                .unwrap();
        }
        let page = store.find_many("Balance", FindManyQuery { limit: Some(2), ..Default::default() }).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.page_info.has_next_page);
    }
}
