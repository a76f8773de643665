//! Database service: provisions live tables for a build, owns the
//! namespace lock, and promotes/restores finalized rows through a
//! bounded-size build cache.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_core::schema::Schema;
use ponder_storage::indexing::{FindManyQuery, IndexingStore};
use ponder_storage::lock::LockStore;

use crate::buildid::{cache_table_name, physical_table_name};
use crate::lock::NamespaceLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    build_id: String,
    tables: Vec<String>,
    finalized_checkpoint: Checkpoint,
}

/// Bounded-size LRU over cached builds' finalized rows. Eviction deletes
/// the evicted build's cache-table rows so the backend doesn't grow
/// without bound across many hot reloads.
pub struct CachePolicy {
    store: Arc<dyn IndexingStore>,
    max_cached_builds: usize,
    entries: Mutex<VecDeque<CacheEntry>>,
}

impl CachePolicy {
    pub fn new(store: Arc<dyn IndexingStore>, max_cached_builds: usize) -> Self {
        Self { store, max_cached_builds: max_cached_builds.max(1), entries: Mutex::new(VecDeque::new()) }
    }

    /// Copy every row with `checkpoint <= finalized_checkpoint` out of
    /// each live table into this build's cache tables, then record (or
    /// refresh) this build as the most-recently-used cache entry,
    /// evicting the least-recently-used entry past capacity.
    ///
    /// Reads the full live table with one `find_many` call rather than
    /// paginating — acceptable for the cache's own bookkeeping since it
    /// only runs on finalization, not on the handler hot path.
    pub async fn promote_from_live(
        &self,
        build_id: &str,
        tables: &HashMap<String, String>,
        finalized_checkpoint: Checkpoint,
    ) -> Result<(), PonderError> {
        for (logical, physical_live) in tables {
            let page = self.store.find_many(physical_live, FindManyQuery::default()).await?;
            let cache_table = cache_table_name(build_id, logical);
            for row in page.items.into_iter().filter(|r| r.checkpoint <= finalized_checkpoint) {
                self.store.upsert(&cache_table, row).await?;
            }
        }

        let evicted = {
            let mut entries = self.entries.lock().unwrap();
            entries.retain(|e| e.build_id != build_id);
            entries.push_back(CacheEntry {
                build_id: build_id.to_string(),
                tables: tables.keys().cloned().collect(),
                finalized_checkpoint,
            });
            let mut evicted = Vec::new();
            while entries.len() > self.max_cached_builds {
                if let Some(e) = entries.pop_front() {
                    evicted.push(e);
                }
            }
            evicted
        };

        for entry in &evicted {
            self.evict(entry).await?;
        }
        Ok(())
    }

    /// `true` (and marks the entry most-recently-used) if `build_id` has
    /// cached finalized rows.
    fn lookup(&self, build_id: &str) -> Option<(Vec<String>, Checkpoint)> {
        let mut entries = self.entries.lock().unwrap();
        let pos = entries.iter().position(|e| e.build_id == build_id)?;
        let entry = entries.remove(pos).unwrap();
        let result = (entry.tables.clone(), entry.finalized_checkpoint);
        entries.push_back(entry);
        Some(result)
    }

    /// Copy `build_id`'s cache tables into the given live physical
    /// tables.
    async fn restore_into(&self, build_id: &str, tables: &HashMap<String, String>) -> Result<(), PonderError> {
        for (logical, physical_live) in tables {
            let cache_table = cache_table_name(build_id, logical);
            let page = self.store.find_many(&cache_table, FindManyQuery::default()).await?;
            if !page.items.is_empty() {
                self.store.create_many(physical_live, page.items).await?;
            }
        }
        Ok(())
    }

    async fn evict(&self, entry: &CacheEntry) -> Result<(), PonderError> {
        for logical in &entry.tables {
            let cache_table = cache_table_name(&entry.build_id, logical);
            loop {
                let page = self.store.find_many(&cache_table, FindManyQuery { limit: Some(200), ..Default::default() }).await?;
                if page.items.is_empty() {
                    break;
                }
                for row in &page.items {
                    self.store.delete(&cache_table, &row.id).await?;
                }
                if !page.page_info.has_next_page {
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Result of `DatabaseService::setup`: where this build's rows live, and
/// the checkpoint to resume from.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub checkpoint: Checkpoint,
    /// Logical schema table name -> physical backend table name.
    pub tables: HashMap<String, String>,
}

pub struct DatabaseService {
    lock: NamespaceLock,
    cache: CachePolicy,
}

impl DatabaseService {
    pub fn new(
        indexing: Arc<dyn IndexingStore>,
        lock_store: Arc<dyn LockStore>,
        namespace: impl Into<String>,
        lease_ttl_ms: i64,
        max_cached_builds: usize,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            lock: NamespaceLock::new(lock_store, namespace, lease_ttl_ms),
            cache: CachePolicy::new(indexing, max_cached_builds),
        }
    }

    pub fn namespace(&self) -> &str {
        self.lock.namespace()
    }

    /// The five-branch setup decision: acquire the lock, then reuse,
    /// cache-restore, or freshly provision live tables depending on what
    /// the namespace previously held.
    pub async fn setup(&self, schema: &Schema, build_id: &str, now_ms: i64) -> Result<SetupOutcome, PonderError> {
        let schema_json = serde_json::to_string(schema).map_err(|e| PonderError::Other(e.to_string()))?;
        let tables: HashMap<String, String> = schema
            .tables
            .keys()
            .map(|t| (t.clone(), physical_table_name(self.lock.namespace(), build_id, t)))
            .collect();

        let acquisition = self.lock.acquire(build_id, &schema_json, now_ms).await?;

        let checkpoint = match &acquisition.prior {
            Some(row) if row.build_id == build_id && row.schema_json == schema_json => {
                tracing::debug!(build_id, namespace = self.lock.namespace(), "reusing live tables for unchanged build");
                Checkpoint::decode(&row.finalized_checkpoint)?
            }
            _ => match self.cache.lookup(build_id) {
                Some((_, finalized_checkpoint)) => {
                    tracing::info!(build_id, "restoring finalized rows from build cache");
                    self.cache.restore_into(build_id, &tables).await?;
                    self.lock.advance_finalized_checkpoint(finalized_checkpoint).await?;
                    finalized_checkpoint
                }
                None => {
                    tracing::info!(build_id, "no cache entry; starting build from genesis");
                    Checkpoint::ZERO
                }
            },
        };

        Ok(SetupOutcome { checkpoint, tables })
    }

    pub async fn heartbeat(&self, now_ms: i64) -> Result<(), PonderError> {
        self.lock.heartbeat(now_ms).await
    }

    /// Flush rows up to `finalized_checkpoint` to the build cache and
    /// advance the lock's recorded finalized checkpoint.
    pub async fn promote_finalized(
        &self,
        build_id: &str,
        tables: &HashMap<String, String>,
        finalized_checkpoint: Checkpoint,
    ) -> Result<(), PonderError> {
        self.cache.promote_from_live(build_id, tables, finalized_checkpoint).await?;
        self.lock.advance_finalized_checkpoint(finalized_checkpoint).await
    }

    /// Release the namespace lock. Does not flush the cache — callers
    /// that want a final promotion should call `promote_finalized` first.
    pub async fn kill(&self) -> Result<(), PonderError> {
        self.lock.release().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ponder_core::checkpoint::Checkpoint;
    use ponder_core::schema::{Column, ColumnType, Scalar, Table};
    use ponder_storage::indexing::{MemoryIndexingStore, Row};
    use ponder_storage::lock::MemoryLockStore;
    use serde_json::json;

    fn pet_person_schema() -> Schema {
        Schema::new()
            .with_table(Table {
                name: "Pet".into(),
                columns: vec![
                    Column { name: "id".into(), column_type: ColumnType::Scalar(Scalar::String), optional: false, list: false },
                    Column { name: "name".into(), column_type: ColumnType::Scalar(Scalar::String), optional: false, list: false },
                    Column { name: "age".into(), column_type: ColumnType::Scalar(Scalar::Int), optional: true, list: false },
                ],
            })
            .with_table(Table {
                name: "Person".into(),
                columns: vec![
                    Column { name: "id".into(), column_type: ColumnType::Scalar(Scalar::String), optional: false, list: false },
                    Column { name: "name".into(), column_type: ColumnType::Scalar(Scalar::String), optional: false, list: false },
                ],
            })
    }

    fn service(indexing: Arc<dyn IndexingStore>, lock_store: Arc<dyn LockStore>) -> DatabaseService {
        DatabaseService::new(indexing, lock_store, "public", 60_000, 3)
    }

    #[tokio::test]
    async fn fresh_sqlite_style_setup_starts_at_zero_checkpoint() {
        let svc = service(Arc::new(MemoryIndexingStore::default()), Arc::new(MemoryLockStore::new()));
        let schema = pet_person_schema();
        let outcome = svc.setup(&schema, "abc", 0).await.unwrap();
        assert_eq!(outcome.checkpoint, Checkpoint::ZERO);
        assert!(outcome.tables.contains_key("Pet"));
        assert!(outcome.tables.contains_key("Person"));
    }

    #[tokio::test]
    async fn lock_contention_then_succeeds_after_lease_expires() {
        let lock_store = Arc::new(MemoryLockStore::new());
        let indexing: Arc<dyn IndexingStore> = Arc::new(MemoryIndexingStore::default());
        let svc = service(indexing, lock_store);
        let schema = pet_person_schema();

        svc.setup(&schema, "abc", 0).await.unwrap();
        let err = svc.setup(&schema, "def", 1_000).await.unwrap_err();
        assert!(matches!(err, PonderError::NamespaceLocked { .. }));

        let outcome = svc.setup(&schema, "def", 60_001).await.unwrap();
        assert_eq!(outcome.checkpoint, Checkpoint::ZERO);
    }

    #[tokio::test]
    async fn setup_same_build_id_reuses_tables() {
        let indexing = Arc::new(MemoryIndexingStore::default());
        let lock_store = Arc::new(MemoryLockStore::new());
        let svc = service(indexing.clone(), lock_store.clone());
        let schema = pet_person_schema();

        let first = svc.setup(&schema, "abc", 0).await.unwrap();
        let pet_table = first.tables["Pet"].clone();
        indexing
            .create(&pet_table, Row { id: "1".into(), data: json!({"name": "Fido"}), checkpoint: Checkpoint::new(5, 1, 5, 0, 0) })
            .await
            .unwrap();
        svc.promote_finalized("abc", &first.tables, Checkpoint::new(5, 1, 5, 0, 0)).await.unwrap();
        svc.kill().await.unwrap();

        // A fresh `DatabaseService` reacquires the same namespace: same
        // build ID and schema, so it reuses the live tables and resumes
        // from the already-finalized checkpoint rather than replaying
        // from genesis.
        let svc2 = service(indexing, lock_store);
        let second = svc2.setup(&schema, "abc", 100).await.unwrap();
        assert_eq!(second.checkpoint, Checkpoint::new(5, 1, 5, 0, 0));
        assert_eq!(second.tables["Pet"], pet_table);
    }

    #[tokio::test]
    async fn cache_reuse_restores_finalized_rows_for_a_previously_cached_build() {
        let indexing = Arc::new(MemoryIndexingStore::default());
        let lock_store = Arc::new(MemoryLockStore::new());
        let svc = service(indexing.clone(), lock_store.clone());
        let schema = pet_person_schema();

        // Build "A" indexes one Pet row and finalizes it, then the
        // process restarts into build "B" (e.g. a schema change).
        let a = svc.setup(&schema, "A", 0).await.unwrap();
        indexing
            .create(&a.tables["Pet"], Row { id: "1".into(), data: json!({"name": "Fido"}), checkpoint: Checkpoint::new(1, 1, 1, 0, 0) })
            .await
            .unwrap();
        svc.promote_finalized("A", &a.tables, Checkpoint::new(1, 1, 1, 0, 0)).await.unwrap();
        svc.kill().await.unwrap();

        svc.setup(&schema, "B", 100).await.unwrap();
        svc.kill().await.unwrap();

        // Hot-reloading back to build "A" restores its cached rows
        // instead of replaying from genesis.
        let restored = svc.setup(&schema, "A", 200).await.unwrap();
        assert_eq!(restored.checkpoint, Checkpoint::new(1, 1, 1, 0, 0));
        let row = indexing.find_unique(&restored.tables["Pet"], "1").await.unwrap().unwrap();
        assert_eq!(row.data["name"], "Fido");
    }

    #[tokio::test]
    async fn non_ponder_tables_are_never_touched_by_setup() {
        let indexing = Arc::new(MemoryIndexingStore::default());
        let lock_store = Arc::new(MemoryLockStore::new());
        indexing
            .create("not_a_ponder_table", Row { id: "x".into(), data: json!({"whatever": true}), checkpoint: Checkpoint::ZERO })
            .await
            .unwrap();

        let svc = service(indexing.clone(), lock_store.clone());
        let schema = pet_person_schema();
        svc.setup(&schema, "abc", 0).await.unwrap();
        svc.kill().await.unwrap();
        svc.setup(&schema, "def", 1).await.unwrap();

        let row = indexing.find_unique("not_a_ponder_table", "x").await.unwrap().unwrap();
        assert_eq!(row.data["whatever"], true);
    }
}
