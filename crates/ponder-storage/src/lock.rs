//! Namespace lock table: one row per namespace, guarding exclusive write
//! access to a database for a given build ID.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use ponder_core::error::PonderError;

#[derive(Debug, Clone, PartialEq)]
pub struct LockRow {
    pub namespace: String,
    pub is_locked: bool,
    pub heartbeat_at: i64,
    pub build_id: String,
    pub finalized_checkpoint: String,
    pub schema_json: String,
}

#[async_trait]
pub trait LockStore: Send + Sync {
    async fn get(&self, namespace: &str) -> Result<Option<LockRow>, PonderError>;

    /// Insert or overwrite the row for `namespace` (caller has already
    /// decided acquisition is valid — dead-lease or unlocked).
    async fn put(&self, row: LockRow) -> Result<(), PonderError>;

    async fn heartbeat(&self, namespace: &str, now: i64) -> Result<(), PonderError>;

    async fn release(&self, namespace: &str) -> Result<(), PonderError>;
}

#[derive(Default)]
pub struct MemoryLockStore {
    rows: Mutex<HashMap<String, LockRow>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn get(&self, namespace: &str) -> Result<Option<LockRow>, PonderError> {
        Ok(self.rows.lock().unwrap().get(namespace).cloned())
    }

    async fn put(&self, row: LockRow) -> Result<(), PonderError> {
        self.rows.lock().unwrap().insert(row.namespace.clone(), row);
        Ok(())
    }

    async fn heartbeat(&self, namespace: &str, now: i64) -> Result<(), PonderError> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(namespace) {
            row.heartbeat_at = now;
        }
        Ok(())
    }

    async fn release(&self, namespace: &str) -> Result<(), PonderError> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(namespace) {
            row.is_locked = false;
        }
        debug!(namespace, "namespace lock released");
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub struct SqliteLockStore {
        pool: SqlitePool,
    }

    impl SqliteLockStore {
        pub async fn new(pool: SqlitePool) -> Result<Self, PonderError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS namespace_lock (
                    namespace TEXT PRIMARY KEY, is_locked INTEGER NOT NULL, heartbeat_at INTEGER NOT NULL,
                    build_id TEXT NOT NULL, finalized_checkpoint TEXT NOT NULL, schema_json TEXT NOT NULL
                );",
            )
            .execute(&pool)
            .await
            .map_err(|e| PonderError::Storage(e.to_string()))?;
            Ok(Self { pool })
        }
    }

    #[async_trait]
    impl LockStore for SqliteLockStore {
        async fn get(&self, namespace: &str) -> Result<Option<LockRow>, PonderError> {
            let row = sqlx::query(
                "SELECT namespace, is_locked, heartbeat_at, build_id, finalized_checkpoint, schema_json
                 FROM namespace_lock WHERE namespace = ?",
            )
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PonderError::Storage(e.to_string()))?;

            Ok(row.map(|r| LockRow {
                namespace: r.get("namespace"),
                is_locked: r.get::<i64, _>("is_locked") != 0,
                heartbeat_at: r.get("heartbeat_at"),
                build_id: r.get("build_id"),
                finalized_checkpoint: r.get("finalized_checkpoint"),
                schema_json: r.get("schema_json"),
            }))
        }

        async fn put(&self, row: LockRow) -> Result<(), PonderError> {
            sqlx::query(
                "INSERT OR REPLACE INTO namespace_lock
                 (namespace, is_locked, heartbeat_at, build_id, finalized_checkpoint, schema_json)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.namespace)
            .bind(row.is_locked as i64)
            .bind(row.heartbeat_at)
            .bind(&row.build_id)
            .bind(&row.finalized_checkpoint)
            .bind(&row.schema_json)
            .execute(&self.pool)
            .await
            .map_err(|e| PonderError::Storage(e.to_string()))?;
            Ok(())
        }

        async fn heartbeat(&self, namespace: &str, now: i64) -> Result<(), PonderError> {
            sqlx::query("UPDATE namespace_lock SET heartbeat_at = ? WHERE namespace = ?")
                .bind(now)
                .bind(namespace)
                .execute(&self.pool)
                .await
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            Ok(())
        }

        async fn release(&self, namespace: &str) -> Result<(), PonderError> {
            sqlx::query("UPDATE namespace_lock SET is_locked = 0 WHERE namespace = ?")
                .bind(namespace)
                .execute(&self.pool)
                .await
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(namespace: &str, locked: bool, heartbeat_at: i64) -> LockRow {
        LockRow {
            namespace: namespace.into(),
            is_locked: locked,
            heartbeat_at,
            build_id: "build1".into(),
            finalized_checkpoint: ponder_core::checkpoint::Checkpoint::ZERO.encode(),
            schema_json: "{}".into(),
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryLockStore::new();
        store.put(row("public", true, 1000)).await.unwrap();
        let loaded = store.get("public").await.unwrap().unwrap();
        assert!(loaded.is_locked);
        assert_eq!(loaded.build_id, "build1");
    }

    #[tokio::test]
    async fn heartbeat_updates_timestamp() {
        let store = MemoryLockStore::new();
        store.put(row("public", true, 1000)).await.unwrap();
        store.heartbeat("public", 2000).await.unwrap();
        assert_eq!(store.get("public").await.unwrap().unwrap().heartbeat_at, 2000);
    }

    #[tokio::test]
    async fn release_clears_is_locked() {
        let store = MemoryLockStore::new();
        store.put(row("public", true, 1000)).await.unwrap();
        store.release("public").await.unwrap();
        assert!(!store.get("public").await.unwrap().unwrap().is_locked);
    }

    #[tokio::test]
    async fn missing_namespace_returns_none() {
        let store = MemoryLockStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
