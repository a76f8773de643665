//! SQLite-backed indexing store. Rows from every logical table live in a
//! single physical `_ponder_rows` table keyed by `(table_name, id)`; the
//! per-build hashed table names themselves are a `ponder-db` concern.

use async_trait::async_trait;
use sqlx::{Row as SqlxRow, SqlitePool};
use tracing::debug;

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;

use super::{FindManyQuery, IndexingStore, Page, PageInfo, Row};

pub struct SqliteIndexingStore {
    pool: SqlitePool,
}

fn storage_err(e: sqlx::Error) -> PonderError {
    PonderError::Storage(e.to_string())
}

impl SqliteIndexingStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, PonderError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _ponder_rows (
                table_name TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                checkpoint TEXT NOT NULL,
                PRIMARY KEY (table_name, id)
            );",
        )
        .execute(&pool)
        .await
        .map_err(storage_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_ponder_rows_checkpoint ON _ponder_rows(checkpoint);")
            .execute(&pool)
            .await
            .map_err(storage_err)?;
        Ok(Self { pool })
    }

    fn decode_row(table_row: sqlx::sqlite::SqliteRow) -> Result<Row, PonderError> {
        let data: String = table_row.get("data");
        let checkpoint: String = table_row.get("checkpoint");
        Ok(Row {
            id: table_row.get("id"),
            data: serde_json::from_str(&data).map_err(|e| PonderError::Storage(e.to_string()))?,
            checkpoint: Checkpoint::decode(&checkpoint)?,
        })
    }
}

#[async_trait]
impl IndexingStore for SqliteIndexingStore {
    async fn create(&self, table: &str, row: Row) -> Result<(), PonderError> {
        let existing = self.find_unique(table, &row.id).await?;
        if existing.is_some() {
            return Err(PonderError::Storage(format!("unique violation: {table}.{}", row.id)));
        }
        let data = serde_json::to_string(&row.data).map_err(|e| PonderError::Storage(e.to_string()))?;
        sqlx::query("INSERT INTO _ponder_rows (table_name, id, data, checkpoint) VALUES (?, ?, ?, ?)")
            .bind(table)
            .bind(&row.id)
            .bind(&data)
            .bind(row.checkpoint.encode())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn create_many(&self, table: &str, rows: Vec<Row>) -> Result<(), PonderError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for row in rows {
            let exists = sqlx::query("SELECT 1 FROM _ponder_rows WHERE table_name = ? AND id = ?")
                .bind(table)
                .bind(&row.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_err)?
                .is_some();
            if exists {
                return Err(PonderError::Storage(format!("unique violation: {table}.{}", row.id)));
            }
            let data = serde_json::to_string(&row.data).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query("INSERT INTO _ponder_rows (table_name, id, data, checkpoint) VALUES (?, ?, ?, ?)")
                .bind(table)
                .bind(&row.id)
                .bind(&data)
                .bind(row.checkpoint.encode())
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        data: serde_json::Value,
        checkpoint: Checkpoint,
    ) -> Result<(), PonderError> {
        let data = serde_json::to_string(&data).map_err(|e| PonderError::Storage(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE _ponder_rows SET data = ?, checkpoint = ? WHERE table_name = ? AND id = ?",
        )
        .bind(&data)
        .bind(checkpoint.encode())
        .bind(table)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(PonderError::Storage(format!("not found: {table}.{id}")));
        }
        Ok(())
    }

    async fn upsert(&self, table: &str, row: Row) -> Result<(), PonderError> {
        let data = serde_json::to_string(&row.data).map_err(|e| PonderError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO _ponder_rows (table_name, id, data, checkpoint) VALUES (?, ?, ?, ?)
             ON CONFLICT(table_name, id) DO UPDATE SET data = excluded.data, checkpoint = excluded.checkpoint",
        )
        .bind(table)
        .bind(&row.id)
        .bind(&data)
        .bind(row.checkpoint.encode())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, PonderError> {
        let result = sqlx::query("DELETE FROM _ponder_rows WHERE table_name = ? AND id = ?")
            .bind(table)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_unique(&self, table: &str, id: &str) -> Result<Option<Row>, PonderError> {
        let row = sqlx::query("SELECT id, data, checkpoint FROM _ponder_rows WHERE table_name = ? AND id = ?")
            .bind(table)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(Self::decode_row).transpose()
    }

    async fn find_many(&self, table: &str, query: FindManyQuery) -> Result<Page, PonderError> {
        let mut sql = String::from("SELECT id, data, checkpoint FROM _ponder_rows WHERE table_name = ?");
        if query.after.is_some() {
            sql.push_str(" AND id > ?");
        }
        if query.before.is_some() {
            sql.push_str(" AND id < ?");
        }
        sql.push_str(" ORDER BY id ASC");

        let fetch_limit = query.limit.map(|l| l as i64 + 1);
        if fetch_limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query(&sql).bind(table);
        if let Some(after) = &query.after {
            q = q.bind(after);
        }
        if let Some(before) = &query.before {
            q = q.bind(before);
        }
        if let Some(limit) = fetch_limit {
            q = q.bind(limit);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(storage_err)?;
        let mut items = rows.into_iter().map(Self::decode_row).collect::<Result<Vec<_>, _>>()?;

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
        debug!(to = %to_checkpoint.encode(), "reverting indexed rows");
        sqlx::query("DELETE FROM _ponder_rows WHERE checkpoint > ?")
            .bind(to_checkpoint.encode())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteIndexingStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteIndexingStore::new(pool).await.unwrap()
    }

    fn row(id: &str, value: i64, checkpoint: Checkpoint) -> Row {
        Row { id: id.into(), data: serde_json::json!({"value": value}), checkpoint }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = store().await;
        store.create("Balance", row("alice", 100, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        let found = store.find_unique("Balance", "alice").await.unwrap().unwrap();
        assert_eq!(found.data["value"], 100);
    }

    #[tokio::test]
    async fn create_duplicate_fails() {
        let store = store().await;
        store.create("Balance", row("alice", 100, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        let result = store.create("Balance", row("alice", 200, Checkpoint::new(2, 1, 2, 0, 0))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn upsert_then_delete() {
        let store = store().await;
        store.upsert("Balance", row("alice", 1, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        store.upsert("Balance", row("alice", 2, Checkpoint::new(2, 1, 2, 0, 0))).await.unwrap();
        let found = store.find_unique("Balance", "alice").await.unwrap().unwrap();
        assert_eq!(found.data["value"], 2);
        assert!(store.delete("Balance", "alice").await.unwrap());
        assert!(store.find_unique("Balance", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revert_removes_rows_above_checkpoint() {
        let store = store().await;
        store.create("Balance", row("alice", 1, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        store.create("Balance", row("bob", 2, Checkpoint::new(5, 1, 5, 0, 0))).await.unwrap();

        store.revert(Checkpoint::new(1, 1, 1, 0, 0)).await.unwrap();

        assert!(store.find_unique("Balance", "alice").await.unwrap().is_some());
        assert!(store.find_unique("Balance", "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_many_paginates_with_limit() {
        let store = store().await;
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

    #[tokio::test]
    async fn tables_are_isolated_by_name() {
        let store = store().await;
        store.create("Balance", row("same-id", 1, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        store.create("Transfer", row("same-id", 2, Checkpoint::new(1, 1, 1, 0, 0))).await.unwrap();
        assert_eq!(store.find_unique("Balance", "same-id").await.unwrap().unwrap().data["value"], 1);
        assert_eq!(store.find_unique("Transfer", "same-id").await.unwrap().unwrap().data["value"], 2);
    }
}
