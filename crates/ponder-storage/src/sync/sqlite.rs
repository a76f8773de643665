//! SQLite sync store backend.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_core::schema::ChildAddressLocation;
use ponder_core::types::{BlockHeader, LogSummary, ReceiptSummary, TransactionSummary};

use super::{Interval, LogEvent, LogEventQuery, SyncStore, merge_intervals};

pub struct SqliteSyncStore {
    pool: SqlitePool,
}

fn storage_err(e: sqlx::Error) -> PonderError {
    PonderError::Storage(e.to_string())
}

impl SqliteSyncStore {
    pub async fn open(path: &str) -> Result<Self, PonderError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, PonderError> {
        let pool = SqlitePool::connect("sqlite::memory:").await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), PonderError> {
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&self.pool).await.map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                chain_id INTEGER NOT NULL, hash TEXT NOT NULL, number INTEGER NOT NULL,
                parent_hash TEXT NOT NULL, timestamp INTEGER NOT NULL, data TEXT NOT NULL,
                PRIMARY KEY (chain_id, hash)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                chain_id INTEGER NOT NULL, hash TEXT NOT NULL, block_hash TEXT NOT NULL,
                block_number INTEGER NOT NULL, data TEXT NOT NULL,
                PRIMARY KEY (chain_id, hash)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transaction_receipts (
                chain_id INTEGER NOT NULL, transaction_hash TEXT NOT NULL,
                block_number INTEGER NOT NULL, data TEXT NOT NULL,
                PRIMARY KEY (chain_id, transaction_hash)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (
                chain_id INTEGER NOT NULL, block_hash TEXT NOT NULL, log_index INTEGER NOT NULL,
                block_number INTEGER NOT NULL, transaction_hash TEXT NOT NULL,
                address TEXT NOT NULL, checkpoint TEXT NOT NULL, data TEXT NOT NULL,
                PRIMARY KEY (chain_id, block_hash, log_index)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_logs_checkpoint ON logs (checkpoint);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS log_filter_intervals (
                filter_id TEXT NOT NULL, start_block INTEGER NOT NULL, end_block INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS factory_filter_intervals (
                factory_id TEXT NOT NULL, start_block INTEGER NOT NULL, end_block INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rpc_request_results (
                chain_id INTEGER NOT NULL, block_number INTEGER NOT NULL, request TEXT NOT NULL,
                result TEXT NOT NULL,
                PRIMARY KEY (chain_id, block_number, request)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn load_intervals(&self, table: &str, key_col: &str, key: &str) -> Result<Vec<Interval>, PonderError> {
        let sql = format!("SELECT start_block, end_block FROM {table} WHERE {key_col} = ?");
        let rows = sqlx::query(&sql).bind(key).fetch_all(&self.pool).await.map_err(storage_err)?;
        Ok(rows
            .into_iter()
            .map(|r| Interval::new(r.get::<i64, _>("start_block") as u64, r.get::<i64, _>("end_block") as u64))
            .collect())
    }

    async fn store_intervals(
        &self,
        table: &str,
        key_col: &str,
        key: &str,
        intervals: &[Interval],
    ) -> Result<(), PonderError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let delete_sql = format!("DELETE FROM {table} WHERE {key_col} = ?");
        sqlx::query(&delete_sql).bind(key).execute(&mut *tx).await.map_err(storage_err)?;
        let insert_sql = format!("INSERT INTO {table} ({key_col}, start_block, end_block) VALUES (?, ?, ?)");
        for interval in intervals {
            sqlx::query(&insert_sql)
                .bind(key)
                .bind(interval.start as i64)
                .bind(interval.end as i64)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    async fn insert_blocks(&self, blocks: &[BlockHeader]) -> Result<(), PonderError> {
        for b in blocks {
            let data = serde_json::to_string(b).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT OR REPLACE INTO blocks (chain_id, hash, number, parent_hash, timestamp, data)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(b.chain_id as i64)
            .bind(&b.hash)
            .bind(b.number as i64)
            .bind(&b.parent_hash)
            .bind(b.timestamp as i64)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        }
        debug!(count = blocks.len(), "blocks stored");
        Ok(())
    }

    async fn insert_transactions(&self, txs: &[TransactionSummary]) -> Result<(), PonderError> {
        for t in txs {
            let data = serde_json::to_string(t).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT OR REPLACE INTO transactions (chain_id, hash, block_hash, block_number, data)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(t.chain_id as i64)
            .bind(&t.hash)
            .bind(&t.block_hash)
            .bind(t.block_number as i64)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn insert_receipts(&self, receipts: &[ReceiptSummary]) -> Result<(), PonderError> {
        for r in receipts {
            let data = serde_json::to_string(r).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT OR REPLACE INTO transaction_receipts (chain_id, transaction_hash, block_number, data)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(r.chain_id as i64)
            .bind(&r.transaction_hash)
            .bind(r.block_number as i64)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn insert_logs(&self, logs: &[(LogSummary, Checkpoint)]) -> Result<(), PonderError> {
        for (log, checkpoint) in logs {
            let data = serde_json::to_string(log).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT OR REPLACE INTO logs
                 (chain_id, block_hash, log_index, block_number, transaction_hash, address, checkpoint, data)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(log.chain_id as i64)
            .bind(&log.block_hash)
            .bind(log.log_index as i64)
            .bind(log.block_number as i64)
            .bind(&log.transaction_hash)
            .bind(&log.address)
            .bind(checkpoint.encode())
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        }
        debug!(count = logs.len(), "logs stored");
        Ok(())
    }

    async fn insert_log_filter_interval(&self, filter_id: &str, interval: Interval) -> Result<(), PonderError> {
        let existing = self.load_intervals("log_filter_intervals", "filter_id", filter_id).await?;
        let merged = merge_intervals(&existing, interval);
        self.store_intervals("log_filter_intervals", "filter_id", filter_id, &merged).await
    }

    async fn get_log_filter_intervals(&self, filter_id: &str) -> Result<Vec<Interval>, PonderError> {
        self.load_intervals("log_filter_intervals", "filter_id", filter_id).await
    }

    async fn insert_factory_filter_interval(&self, factory_id: &str, interval: Interval) -> Result<(), PonderError> {
        let existing = self.load_intervals("factory_filter_intervals", "factory_id", factory_id).await?;
        let merged = merge_intervals(&existing, interval);
        self.store_intervals("factory_filter_intervals", "factory_id", factory_id, &merged).await
    }

    async fn get_factory_filter_intervals(&self, factory_id: &str) -> Result<Vec<Interval>, PonderError> {
        self.load_intervals("factory_filter_intervals", "factory_id", factory_id).await
    }

    async fn get_log_events(&self, query: LogEventQuery) -> Result<Vec<LogEvent>, PonderError> {
        let mut sql = String::from(
            "SELECT l.data as log_data, l.checkpoint as checkpoint,
                    b.data as block_data, t.data as tx_data, r.data as receipt_data
             FROM logs l
             JOIN blocks b ON b.chain_id = l.chain_id AND b.hash = l.block_hash
             JOIN transactions t ON t.chain_id = l.chain_id AND t.hash = l.transaction_hash
             LEFT JOIN transaction_receipts r ON r.chain_id = l.chain_id AND r.transaction_hash = l.transaction_hash
             WHERE 1 = 1",
        );
        if query.chain_id.is_some() {
            sql.push_str(" AND l.chain_id = ?");
        }
        if query.from_checkpoint.is_some() {
            sql.push_str(" AND l.checkpoint >= ?");
        }
        if query.to_checkpoint.is_some() {
            sql.push_str(" AND l.checkpoint <= ?");
        }
        sql.push_str(" ORDER BY l.checkpoint");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query(&sql);
        if let Some(chain_id) = query.chain_id {
            q = q.bind(chain_id as i64);
        }
        if let Some(from) = query.from_checkpoint {
            q = q.bind(from.encode());
        }
        if let Some(to) = query.to_checkpoint {
            q = q.bind(to.encode());
        }

        let rows = q.fetch_all(&self.pool).await.map_err(storage_err)?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let log: LogSummary = serde_json::from_str(row.get::<&str, _>("log_data"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let block: BlockHeader = serde_json::from_str(row.get::<&str, _>("block_data"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let transaction: TransactionSummary = serde_json::from_str(row.get::<&str, _>("tx_data"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let receipt: Option<ReceiptSummary> = row
                .get::<Option<&str>, _>("receipt_data")
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let checkpoint = Checkpoint::decode(row.get::<&str, _>("checkpoint"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            events.push(LogEvent { log, block, transaction, receipt, checkpoint });
        }
        Ok(events)
    }

    async fn get_factory_child_addresses(
        &self,
        factory_address: &str,
        event_selector: &str,
        child_address_location: ChildAddressLocation,
        up_to_block: u64,
    ) -> Result<Vec<String>, PonderError> {
        let rows = sqlx::query(
            "SELECT data FROM logs
             WHERE address = ? AND block_number <= ?",
        )
        .bind(factory_address)
        .bind(up_to_block as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut addrs: Vec<String> = Vec::new();
        for row in rows {
            let log: LogSummary = serde_json::from_str(row.get::<&str, _>("data"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            if log.topic0().map(|t| t.eq_ignore_ascii_case(event_selector)).unwrap_or(false) {
                if let Some(addr) = child_address_location.extract(&log.topics, &log.data) {
                    addrs.push(addr);
                }
            }
        }
        addrs.sort();
        addrs.dedup();
        Ok(addrs)
    }

    async fn prune_by_block(&self, chain_id: u64, from_block: u64) -> Result<(), PonderError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        sqlx::query("DELETE FROM logs WHERE chain_id = ? AND block_number > ?")
            .bind(chain_id as i64)
            .bind(from_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM transaction_receipts WHERE chain_id = ? AND block_number > ?")
            .bind(chain_id as i64)
            .bind(from_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM transactions WHERE chain_id = ? AND block_number > ?")
            .bind(chain_id as i64)
            .bind(from_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM blocks WHERE chain_id = ? AND number > ?")
            .bind(chain_id as i64)
            .bind(from_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        debug!(chain_id, from_block, "pruned sync store");
        Ok(())
    }

    async fn get_cached_request(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
    ) -> Result<Option<serde_json::Value>, PonderError> {
        let row = sqlx::query(
            "SELECT result FROM rpc_request_results WHERE chain_id = ? AND block_number = ? AND request = ?",
        )
        .bind(chain_id as i64)
        .bind(block_number as i64)
        .bind(request)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| {
            serde_json::from_str(r.get::<&str, _>("result")).map_err(|e| PonderError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn put_cached_request(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
        result: serde_json::Value,
    ) -> Result<(), PonderError> {
        let data = serde_json::to_string(&result).map_err(|e| PonderError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT OR REPLACE INTO rpc_request_results (chain_id, block_number, request, result)
             VALUES (?, ?, ?, ?)",
        )
        .bind(chain_id as i64)
        .bind(block_number as i64)
        .bind(request)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(chain_id: u64, number: u64, hash: &str, parent: &str) -> BlockHeader {
        BlockHeader {
            chain_id,
            number,
            hash: hash.into(),
            parent_hash: parent.into(),
            timestamp: number * 12,
            miner: "0xminer".into(),
            gas_limit: "30000000".into(),
            gas_used: "21000".into(),
            base_fee_per_gas: None,
            state_root: "0x".into(),
            transactions_root: "0x".into(),
            receipts_root: "0x".into(),
            logs_bloom: "0x".into(),
            extra_data: "0x".into(),
            mix_hash: "0x".into(),
            nonce: "0x0".into(),
            difficulty: "0".into(),
            size: None,
        }
    }

    fn tx(chain_id: u64, hash: &str, block_hash: &str, number: u64) -> TransactionSummary {
        TransactionSummary {
            chain_id,
            hash: hash.into(),
            block_hash: block_hash.into(),
            block_number: number,
            transaction_index: 0,
            from: "0xfrom".into(),
            to: Some("0xto".into()),
            value: "0".into(),
            input: "0x".into(),
            nonce: 0,
            gas: "21000".into(),
            gas_price: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            transaction_type: 2,
        }
    }

    fn log(chain_id: u64, block_hash: &str, tx_hash: &str, number: u64, log_index: u64) -> LogSummary {
        LogSummary {
            chain_id,
            address: "0xcontract".into(),
            topics: vec!["0xsig".into()],
            data: "0x".into(),
            block_hash: block_hash.into(),
            block_number: number,
            transaction_hash: tx_hash.into(),
            transaction_index: 0,
            log_index,
            removed: false,
        }
    }

    #[tokio::test]
    async fn insert_and_join_log_event() {
        let store = SqliteSyncStore::in_memory().await.unwrap();
        store.insert_blocks(&[block(1, 100, "0xb100", "0xb99")]).await.unwrap();
        store.insert_transactions(&[tx(1, "0xtx1", "0xb100", 100)]).await.unwrap();
        store
            .insert_logs(&[(log(1, "0xb100", "0xtx1", 100, 0), Checkpoint::new(1200, 1, 100, 0, 0))])
            .await
            .unwrap();

        let events = store.get_log_events(LogEventQuery::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block.number, 100);
    }

    #[tokio::test]
    async fn log_filter_intervals_persist_merged() {
        let store = SqliteSyncStore::in_memory().await.unwrap();
        store.insert_log_filter_interval("f1", Interval::new(0, 100)).await.unwrap();
        store.insert_log_filter_interval("f1", Interval::new(101, 200)).await.unwrap();
        let intervals = store.get_log_filter_intervals("f1").await.unwrap();
        assert_eq!(intervals, vec![Interval::new(0, 200)]);
    }

    #[tokio::test]
    async fn prune_by_block_removes_future_rows() {
        let store = SqliteSyncStore::in_memory().await.unwrap();
        store
            .insert_blocks(&[block(1, 100, "0xb100", "0xb99"), block(1, 101, "0xb101", "0xb100")])
            .await
            .unwrap();
        store.prune_by_block(1, 100).await.unwrap();
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM blocks")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("cnt"), 1);
    }

    #[tokio::test]
    async fn rpc_cache_roundtrip() {
        let store = SqliteSyncStore::in_memory().await.unwrap();
        store
            .put_cached_request(1, 100, "eth_call:0x1", serde_json::json!("0xresult"))
            .await
            .unwrap();
        assert_eq!(
            store.get_cached_request(1, 100, "eth_call:0x1").await.unwrap(),
            Some(serde_json::json!("0xresult"))
        );
    }
}
