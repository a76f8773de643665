//! PostgreSQL sync store backend. Same schema and query shape as
//! [`super::sqlite`], adapted to `$n` placeholders and `ON CONFLICT`.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use ponder_core::checkpoint::Checkpoint;
use ponder_core::error::PonderError;
use ponder_core::schema::ChildAddressLocation;
use ponder_core::types::{BlockHeader, LogSummary, ReceiptSummary, TransactionSummary};

use super::{Interval, LogEvent, LogEventQuery, SyncStore, merge_intervals};

pub struct PostgresSyncStore {
    pool: PgPool,
}

fn storage_err(e: sqlx::Error) -> PonderError {
    PonderError::Storage(e.to_string())
}

impl PostgresSyncStore {
    pub async fn connect(database_url: &str) -> Result<Self, PonderError> {
        let pool = PgPool::connect(database_url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), PonderError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                chain_id BIGINT NOT NULL, hash TEXT NOT NULL, number BIGINT NOT NULL,
                parent_hash TEXT NOT NULL, timestamp BIGINT NOT NULL, data JSONB NOT NULL,
                PRIMARY KEY (chain_id, hash)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                chain_id BIGINT NOT NULL, hash TEXT NOT NULL, block_hash TEXT NOT NULL,
                block_number BIGINT NOT NULL, data JSONB NOT NULL,
                PRIMARY KEY (chain_id, hash)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transaction_receipts (
                chain_id BIGINT NOT NULL, transaction_hash TEXT NOT NULL,
                block_number BIGINT NOT NULL, data JSONB NOT NULL,
                PRIMARY KEY (chain_id, transaction_hash)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (
                chain_id BIGINT NOT NULL, block_hash TEXT NOT NULL, log_index BIGINT NOT NULL,
                block_number BIGINT NOT NULL, transaction_hash TEXT NOT NULL,
                address TEXT NOT NULL, checkpoint TEXT NOT NULL, data JSONB NOT NULL,
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
                filter_id TEXT NOT NULL, start_block BIGINT NOT NULL, end_block BIGINT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS factory_filter_intervals (
                factory_id TEXT NOT NULL, start_block BIGINT NOT NULL, end_block BIGINT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rpc_request_results (
                chain_id BIGINT NOT NULL, block_number BIGINT NOT NULL, request TEXT NOT NULL,
                result JSONB NOT NULL,
                PRIMARY KEY (chain_id, block_number, request)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn load_intervals(&self, table: &str, key_col: &str, key: &str) -> Result<Vec<Interval>, PonderError> {
        let sql = format!("SELECT start_block, end_block FROM {table} WHERE {key_col} = $1");
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
        let delete_sql = format!("DELETE FROM {table} WHERE {key_col} = $1");
        sqlx::query(&delete_sql).bind(key).execute(&mut *tx).await.map_err(storage_err)?;
        let insert_sql = format!("INSERT INTO {table} ({key_col}, start_block, end_block) VALUES ($1, $2, $3)");
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
impl SyncStore for PostgresSyncStore {
    async fn insert_blocks(&self, blocks: &[BlockHeader]) -> Result<(), PonderError> {
        for b in blocks {
            let data = serde_json::to_value(b).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO blocks (chain_id, hash, number, parent_hash, timestamp, data)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (chain_id, hash) DO UPDATE SET data = EXCLUDED.data",
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
            let data = serde_json::to_value(t).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO transactions (chain_id, hash, block_hash, block_number, data)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (chain_id, hash) DO UPDATE SET data = EXCLUDED.data",
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
            let data = serde_json::to_value(r).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO transaction_receipts (chain_id, transaction_hash, block_number, data)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (chain_id, transaction_hash) DO UPDATE SET data = EXCLUDED.data",
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
            let data = serde_json::to_value(log).map_err(|e| PonderError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO logs
                 (chain_id, block_hash, log_index, block_number, transaction_hash, address, checkpoint, data)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (chain_id, block_hash, log_index) DO UPDATE SET data = EXCLUDED.data",
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
        let mut n = 0;
        if query.chain_id.is_some() {
            n += 1;
            sql.push_str(&format!(" AND l.chain_id = ${n}"));
        }
        if query.from_checkpoint.is_some() {
            n += 1;
            sql.push_str(&format!(" AND l.checkpoint >= ${n}"));
        }
        if query.to_checkpoint.is_some() {
            n += 1;
            sql.push_str(&format!(" AND l.checkpoint <= ${n}"));
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
            let log: LogSummary = serde_json::from_value(row.get::<serde_json::Value, _>("log_data"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let block: BlockHeader = serde_json::from_value(row.get::<serde_json::Value, _>("block_data"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let transaction: TransactionSummary = serde_json::from_value(row.get::<serde_json::Value, _>("tx_data"))
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let receipt: Option<ReceiptSummary> = row
                .get::<Option<serde_json::Value>, _>("receipt_data")
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| PonderError::Storage(e.to_string()))?;
            let checkpoint = Checkpoint::decode(&row.get::<String, _>("checkpoint"))
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
        let rows = sqlx::query("SELECT data FROM logs WHERE address = $1 AND block_number <= $2")
            .bind(factory_address)
            .bind(up_to_block as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        let mut addrs: Vec<String> = Vec::new();
        for row in rows {
            let log: LogSummary = serde_json::from_value(row.get::<serde_json::Value, _>("data"))
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
        sqlx::query("DELETE FROM logs WHERE chain_id = $1 AND block_number > $2")
            .bind(chain_id as i64)
            .bind(from_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM transaction_receipts WHERE chain_id = $1 AND block_number > $2")
            .bind(chain_id as i64)
            .bind(from_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM transactions WHERE chain_id = $1 AND block_number > $2")
            .bind(chain_id as i64)
            .bind(from_block as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM blocks WHERE chain_id = $1 AND number > $2")
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
            "SELECT result FROM rpc_request_results WHERE chain_id = $1 AND block_number = $2 AND request = $3",
        )
        .bind(chain_id as i64)
        .bind(block_number as i64)
        .bind(request)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<serde_json::Value, _>("result")))
    }

    async fn put_cached_request(
        &self,
        chain_id: u64,
        block_number: u64,
        request: &str,
        result: serde_json::Value,
    ) -> Result<(), PonderError> {
        sqlx::query(
            "INSERT INTO rpc_request_results (chain_id, block_number, request, result)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (chain_id, block_number, request) DO UPDATE SET result = EXCLUDED.result",
        )
        .bind(chain_id as i64)
        .bind(block_number as i64)
        .bind(request)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Integration tests require a running PostgreSQL instance.
    // Set DATABASE_URL to enable: DATABASE_URL=postgresql://localhost/ponder_test cargo test

    use super::*;

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn log_event_roundtrip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
        let store = PostgresSyncStore::connect(&url).await.unwrap();
        store
            .insert_blocks(&[BlockHeader {
                chain_id: 1,
                number: 100,
                hash: "0xb100".into(),
                parent_hash: "0xb99".into(),
                timestamp: 1200,
                miner: "0x0".into(),
                gas_limit: "0".into(),
                gas_used: "0".into(),
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
            }])
            .await
            .unwrap();
        store.prune_by_block(1, 99).await.unwrap();
    }
}
