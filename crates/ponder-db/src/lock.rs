//! Namespace lock wrapper: CAS-based acquisition against `LockStore`,
//! lease expiry, and a background heartbeat task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_storage::lock::{LockRow, LockStore};

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// What the namespace looked like immediately before this acquisition,
/// if it has ever been used.
#[derive(Debug)]
pub struct Acquisition {
    pub prior: Option<LockRow>,
}

pub struct NamespaceLock {
    store: Arc<dyn LockStore>,
    namespace: String,
    lease_ttl_ms: i64,
}

impl NamespaceLock {
    pub fn new(store: Arc<dyn LockStore>, namespace: impl Into<String>, lease_ttl_ms: i64) -> Self {
        Self { store, namespace: namespace.into(), lease_ttl_ms }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Acquire the lock for `build_id`, failing with `NamespaceLocked` if
    /// a different live writer's lease hasn't expired. `now_ms` is
    /// injected rather than read from the system clock so lease-expiry
    /// tests can advance it deterministically.
    pub async fn acquire(&self, build_id: &str, schema_json: &str, now_ms: i64) -> Result<Acquisition, PonderError> {
        let prior = self.store.get(&self.namespace).await?;
        if let Some(row) = &prior {
            let expired = now_ms.saturating_sub(row.heartbeat_at) > self.lease_ttl_ms;
            if row.is_locked && !expired {
                let ms_until_expiry = (self.lease_ttl_ms - now_ms.saturating_sub(row.heartbeat_at)).max(0) as u64;
                return Err(PonderError::NamespaceLocked { namespace: self.namespace.clone(), ms_until_expiry });
            }
        }

        let finalized_checkpoint = prior.as_ref().map(|r| r.finalized_checkpoint.clone()).unwrap_or_else(|| Checkpoint::ZERO.encode());
        self.store
            .put(LockRow {
                namespace: self.namespace.clone(),
                is_locked: true,
                heartbeat_at: now_ms,
                build_id: build_id.to_string(),
                finalized_checkpoint,
                schema_json: schema_json.to_string(),
            })
            .await?;

        Ok(Acquisition { prior })
    }

    pub async fn heartbeat(&self, now_ms: i64) -> Result<(), PonderError> {
        self.store.heartbeat(&self.namespace, now_ms).await
    }

    /// Advance the persisted `finalized_checkpoint` on the held lock row
    /// (used after a cache-promotion pass). No-op if the namespace was
    /// never acquired.
    pub async fn advance_finalized_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), PonderError> {
        if let Some(mut row) = self.store.get(&self.namespace).await? {
            row.finalized_checkpoint = checkpoint.encode();
            self.store.put(row).await?;
        }
        Ok(())
    }

    pub async fn release(&self) -> Result<(), PonderError> {
        self.store.release(&self.namespace).await
    }

    /// Spawn a background task that heartbeats every `interval` until
    /// `stop` is set. The real wall clock is used here; `acquire` and
    /// `heartbeat` themselves stay clock-injectable for tests.
    pub fn spawn_heartbeat(self: Arc<Self>, interval: Duration, stop: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                tokio::time::sleep(interval).await;
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = self.heartbeat(now_ms()).await {
                    tracing::warn!(namespace = self.namespace.as_str(), error = %e, "namespace heartbeat failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ponder_storage::lock::MemoryLockStore;

    fn lock(lease_ttl_ms: i64) -> NamespaceLock {
        NamespaceLock::new(Arc::new(MemoryLockStore::new()), "public", lease_ttl_ms)
    }

    #[tokio::test]
    async fn first_acquisition_has_no_prior_row() {
        let lock = lock(60_000);
        let acq = lock.acquire("abc", "{}", 0).await.unwrap();
        assert!(acq.prior.is_none());
    }

    #[tokio::test]
    async fn second_acquisition_before_release_fails() {
        let lock = lock(60_000);
        lock.acquire("abc", "{}", 0).await.unwrap();
        let err = lock.acquire("def", "{}", 1_000).await.unwrap_err();
        assert!(matches!(err, PonderError::NamespaceLocked { .. }));
    }

    #[tokio::test]
    async fn acquisition_succeeds_after_lease_expires() {
        let lock = lock(60_000);
        lock.acquire("abc", "{}", 0).await.unwrap();
        let acq = lock.acquire("def", "{}", 60_001).await.unwrap();
        assert_eq!(acq.prior.unwrap().build_id, "abc");
    }

    #[tokio::test]
    async fn acquisition_succeeds_immediately_after_release() {
        let lock = lock(60_000);
        lock.acquire("abc", "{}", 0).await.unwrap();
        lock.release().await.unwrap();
        let acq = lock.acquire("def", "{}", 500).await.unwrap();
        assert_eq!(acq.prior.unwrap().build_id, "abc");
    }

    #[tokio::test]
    async fn release_clears_is_locked_on_the_underlying_row() {
        let store = Arc::new(MemoryLockStore::new());
        let lock = NamespaceLock::new(store.clone(), "public", 60_000);
        lock.acquire("abc", "{}", 0).await.unwrap();
        lock.release().await.unwrap();
        assert!(!store.get("public").await.unwrap().unwrap().is_locked);
    }

    #[tokio::test]
    async fn advance_finalized_checkpoint_persists_on_the_row() {
        let store = Arc::new(MemoryLockStore::new());
        let lock = NamespaceLock::new(store.clone(), "public", 60_000);
        lock.acquire("abc", "{}", 0).await.unwrap();
        lock.advance_finalized_checkpoint(Checkpoint::new(1, 1, 100, 0, 0)).await.unwrap();
        let row = store.get("public").await.unwrap().unwrap();
        assert_eq!(Checkpoint::decode(&row.finalized_checkpoint).unwrap(), Checkpoint::new(1, 1, 100, 0, 0));
    }
}
