//! `EthLog` persistence: batch insert from the ingestor, and the scheduler's untranslated-row scan
//! and per-row update.

use sqlx::Row;
use uuid::Uuid;

use svcchan_types::model::{EthAddress, EthLog, Hash32};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Inserts every log in `logs` in one transaction.
    pub async fn insert_eth_logs(&self, logs: &[EthLog]) -> Result<(), StoreError> {
        if logs.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for log in logs {
            let topics: Vec<Vec<u8>> = log.topics.iter().map(|t| t.0.to_vec()).collect();
            sqlx::query(
                "INSERT INTO eth_log (id, tx_hash, block_number, address, data, topics, job, \
                 failures, ignore) VALUES ($1, $2, $3, $4, $5, $6, NULL, 0, false)",
            )
            .bind(log.id.as_uuid())
            .bind(log.tx_hash.0.as_slice())
            .bind(log.block_number as i64)
            .bind(log.address.0.as_slice())
            .bind(log.data.0.as_slice())
            .bind(topics)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Rows the event scheduler has not yet translated into a job: `job IS NULL AND NOT ignore`,
    /// optionally bounded by `failures <= max_retry` (`max_retry = 0` means unbounded), ordered by
    /// `block_number`.
    pub async fn untranslated_logs(&self, max_retry: u64, limit: i64) -> Result<Vec<EthLog>, StoreError> {
        let rows = if max_retry == 0 {
            sqlx::query(
                "SELECT id, tx_hash, block_number, address, data, topics, job, failures, ignore \
                 FROM eth_log WHERE job IS NULL AND NOT ignore ORDER BY block_number LIMIT $1",
            )
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query(
                "SELECT id, tx_hash, block_number, address, data, topics, job, failures, ignore \
                 FROM eth_log WHERE job IS NULL AND NOT ignore AND failures <= $2 \
                 ORDER BY block_number LIMIT $1",
            )
            .bind(limit)
            .bind(max_retry as i64)
            .fetch_all(self.pool())
            .await?
        };
        rows.into_iter().map(log_from_row).collect()
    }

    /// Binds a translated log to the job it produced.
    pub async fn mark_log_job(&self, id: Uuid, job_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE eth_log SET job = $2 WHERE id = $1")
            .bind(id)
            .bind(job_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Marks a log as permanently skipped (duplicate/already-processing, or
    /// superseded by a deletion event).
    pub async fn mark_log_ignored(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE eth_log SET ignore = true WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Records one more failed translation attempt.
    pub async fn increment_log_failures(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE eth_log SET failures = failures + 1 WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Whether an offering-deleted log exists for `offering_hash`, used to suppress a stale offering-
    /// created/popped-up log.
    pub async fn offering_deletion_logged(
        &self,
        service_contract: EthAddress,
        deleted_topic0: Hash32,
        offering_hash: Hash32,
    ) -> Result<bool, StoreError> {
        // `topics` is a 1-indexed SQL array mirroring the Rust `Vec<Hash32>`
        // in order: topics[1] is topic[0] (the event digest), topics[3] is
        // topic[2] (the offering hash, for both `LogOfferingDeleted` and
        // `LogOfferingCreated`/`LogOfferingPopedUp`).
        let row: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM eth_log WHERE address = $1 AND topics[1] = $2 AND topics[3] = $3 LIMIT 1",
        )
        .bind(service_contract.0.as_slice())
        .bind(deleted_topic0.0.as_slice())
        .bind(offering_hash.0.as_slice())
        .fetch_optional(self.pool())
        .await?;
        Ok(row.is_some())
    }
}

fn log_from_row(row: sqlx::postgres::PgRow) -> Result<EthLog, StoreError> {
    let tx_hash_bytes: Vec<u8> = row.get("tx_hash");
    let tx_hash =
        Hash32::from_slice(&tx_hash_bytes).map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
    let address_bytes: Vec<u8> = row.get("address");
    let address = EthAddress::from_slice(&address_bytes)
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
    let topics_bytes: Vec<Vec<u8>> = row.get("topics");
    let topics = topics_bytes
        .into_iter()
        .map(|b| Hash32::from_slice(&b))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
    Ok(EthLog {
        id: row.get::<uuid::Uuid, _>("id").into(),
        tx_hash,
        block_number: row.get::<i64, _>("block_number") as u64,
        address,
        data: row.get::<Vec<u8>, _>("data").into(),
        topics,
        job: row.get::<Option<uuid::Uuid>, _>("job").map(Into::into),
        failures: row.get::<i32, _>("failures") as u32,
        ignore: row.get("ignore"),
    })
}
