//! Shared dependencies and the transaction-submission helper every job
//! handler in this crate builds on.

use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::Address;
use uuid::Uuid;

use svcchan_eth::{EthAdapter, EthAdapterError};
use svcchan_somc::SomcClient;
use svcchan_store::eth_tx::NewEthTx;
use svcchan_store::Store;
use svcchan_types::config::Config;
use svcchan_types::ids::{EthTxId, JobId};
use svcchan_types::jobs::JobType;
use svcchan_types::model::{Account, Blob, EthAddress, Hash32, JobCreator, RelatedType};

use crate::error::WorkerError;

/// Everything a job handler needs beyond the job itself: the store, the
/// chain adapter, the matching-server client, and static configuration.
pub struct WorkerContext {
    pub store: Store,
    pub eth: Arc<EthAdapter>,
    pub somc: Arc<SomcClient>,
    pub config: Arc<Config>,
}

impl WorkerContext {
    pub fn new(store: Store, eth: Arc<EthAdapter>, somc: Arc<SomcClient>, config: Arc<Config>) -> Self {
        Self { store, eth, somc, config }
    }

    /// Decrypts `account`'s private key with the daemon's in-memory
    /// passphrase.
    pub fn decrypt_account_key(&self, account: &Account) -> Result<[u8; 32], WorkerError> {
        let sensitive =
            svcchan_crypto::key_store::decrypt_key(&account.private_key_encrypted.0, &self.config.key_passphrase)?;
        if sensitive.0.len() != 32 {
            return Err(WorkerError::InvalidJob(format!(
                "account {} private key has unexpected length",
                account.id
            )));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&sensitive.0);
        Ok(buf)
    }

    /// Builds, signs, broadcasts, and records a contract-call transaction
    /// from `account`, using the daemon's configured gas price/limit. This
    /// is the one path every handler that mutates chain state goes through.
    pub async fn submit_transaction(
        &self,
        account: &Account,
        to: Address,
        data: Vec<u8>,
        method: &str,
        job: JobId,
        related_type: RelatedType,
        related_id: Uuid,
    ) -> Result<EthTxId, WorkerError> {
        let private_key = self.decrypt_account_key(account)?;
        let signer = self.eth.signer_for(&private_key)?;
        let from = Address::from(account.address.0);
        let nonce = signer
            .get_transaction_count(from, None)
            .await
            .map_err(|e| EthAdapterError::Rpc(e.to_string()))?;
        let gas_price = self.config.eth.default_gas_price;
        let gas_limit = self.config.eth.default_gas_limit;
        let raw = Blob(data.clone());
        let tx = self
            .eth
            .build_contract_call(to, data, gas_price, gas_limit)
            .from(from)
            .nonce(nonce);
        let pending = signer
            .send_transaction(tx, None)
            .await
            .map_err(|e| EthAdapterError::TransactionRejected(e.to_string()))?;
        let tx_hash = Hash32(pending.tx_hash().0);

        let eth_tx_id = self
            .store
            .insert_eth_tx(NewEthTx {
                method,
                job,
                addr_from: account.address,
                addr_to: EthAddress(to.0),
                nonce: nonce.as_u64(),
                gas_price,
                gas_limit,
                raw: &raw,
                related_type,
                related_id,
            })
            .await?;
        self.store.mark_eth_tx_sent(eth_tx_id, tx_hash).await?;
        Ok(eth_tx_id)
    }

    /// Enqueues a follow-up job straight through the store, bypassing
    /// `svcchan-queue`'s `Queue::add`: handlers run inside that queue's own
    /// worker pool, so holding an `Arc<Queue>` here would be circular. This
    /// mirrors `Queue::add`'s duplicate-check/`config_for` logic exactly.
    pub async fn enqueue(
        &self,
        job_type: JobType,
        related_type: RelatedType,
        related_id: Uuid,
        created_by: JobCreator,
        payload: serde_json::Value,
    ) -> Result<Uuid, WorkerError> {
        let cfg = svcchan_types::jobs::config_for(job_type.as_str())
            .ok_or_else(|| WorkerError::InvalidJob(format!("unknown job type {job_type}")))?;
        self.store
            .add_job(job_type.as_str(), related_type, related_id, created_by, payload, cfg.duplicated)
            .await
            .map_err(Into::into)
    }
}
