//! `EthTx` persistence: record a submission, then update it as it is broadcast and mined.

use uuid::Uuid;

use svcchan_types::ids::{EthTxId, JobId};
use svcchan_types::model::{Blob, EthAddress, EthTxStatus, Hash32, RelatedType};

use crate::error::StoreError;
use crate::Store;

/// Everything needed to record a transaction a handler is about to submit.
pub struct NewEthTx<'a> {
    pub method: &'a str,
    pub job: JobId,
    pub addr_from: EthAddress,
    pub addr_to: EthAddress,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub raw: &'a Blob,
    pub related_type: RelatedType,
    pub related_id: Uuid,
}

impl Store {
    /// Records a transaction as `unsent`, before it is broadcast.
    pub async fn insert_eth_tx(&self, tx: NewEthTx<'_>) -> Result<EthTxId, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO eth_tx (id, hash, method, status, job, issued_at, addr_from, addr_to, \
             nonce, gas_price, gas_limit, raw, related_type, related_id) \
             VALUES ($1, NULL, $2, 'unsent', $3, now(), $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(id)
        .bind(tx.method)
        .bind(tx.job.as_uuid())
        .bind(tx.addr_from.0.as_slice())
        .bind(tx.addr_to.0.as_slice())
        .bind(tx.nonce as i64)
        .bind(tx.gas_price as i64)
        .bind(tx.gas_limit as i64)
        .bind(tx.raw.0.as_slice())
        .bind(related_type_str(tx.related_type))
        .bind(tx.related_id)
        .execute(self.pool())
        .await?;
        Ok(EthTxId(id))
    }

    /// Marks a transaction `sent` once broadcast, recording its final hash.
    pub async fn mark_eth_tx_sent(&self, id: EthTxId, hash: Hash32) -> Result<(), StoreError> {
        sqlx::query("UPDATE eth_tx SET status = 'sent', hash = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(hash.0.as_slice())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Updates a transaction's lifecycle state directly (mined/uncled).
    pub async fn update_eth_tx_status(&self, id: EthTxId, status: EthTxStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE eth_tx SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(eth_tx_status_str(status))
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

fn related_type_str(t: RelatedType) -> &'static str {
    match t {
        RelatedType::Offering => "offering",
        RelatedType::Channel => "channel",
        RelatedType::Endpoint => "endpoint",
        RelatedType::Account => "account",
    }
}

fn eth_tx_status_str(status: EthTxStatus) -> &'static str {
    match status {
        EthTxStatus::Unsent => "unsent",
        EthTxStatus::Sent => "sent",
        EthTxStatus::Mined => "mined",
        EthTxStatus::Uncle => "uncle",
    }
}
