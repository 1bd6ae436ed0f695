//! Typed wrapper over the Ethereum JSON-RPC node: block head lookups, log filtering, and raw
//! transaction submission.

use std::sync::Arc;

use ethers::core::k256::ecdsa::{RecoveryId, Signature as RecoverableSignature, VerifyingKey};
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Log, TransactionRequest, H256, U256};
use ethers::utils::rlp::RlpStream;

use svcchan_types::model::{EthAddress, EthLog, Hash32, PublicKey65};

use crate::error::EthAdapterError;

/// A connected Ethereum adapter bound to one chain id and one pair of
/// contract addresses (service-payment-channel and token contracts).
pub struct EthAdapter {
    provider: Arc<Provider<Ws>>,
    chain_id: u64,
    psc_contract: Address,
    ptc_contract: Address,
}

impl EthAdapter {
    /// Connects over WebSocket to `rpc_url`.
    pub async fn connect(
        rpc_url: &str,
        chain_id: u64,
        psc_contract: Address,
        ptc_contract: Address,
    ) -> Result<Self, EthAdapterError> {
        let provider = Provider::<Ws>::connect(rpc_url)
            .await
            .map_err(|e| EthAdapterError::Rpc(e.to_string()))?;
        Ok(Self {
            provider: Arc::new(provider),
            chain_id,
            psc_contract,
            ptc_contract,
        })
    }

    /// The service-payment-channel contract's address.
    pub fn psc_contract(&self) -> Address {
        self.psc_contract
    }

    /// The token contract's address.
    pub fn ptc_contract(&self) -> Address {
        self.ptc_contract
    }

    /// Current chain head block number.
    pub async fn latest_block_number(&self) -> Result<u64, EthAdapterError> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    /// Native-coin balance of `address`, in wei.
    pub async fn native_balance(&self, address: Address) -> Result<U256, EthAdapterError> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    /// Issues a log filter and converts the results into persistence-ready
    /// [`EthLog`] rows, dropping any log the node reports as `removed`
    /// (i.e. it was part of an orphaned block).
    pub async fn get_logs(
        &self,
        filter: &ethers::types::Filter,
    ) -> Result<Vec<EthLog>, EthAdapterError> {
        let logs = self
            .provider
            .get_logs(filter)
            .await
            .map_err(|e| EthAdapterError::Rpc(e.to_string()))?;
        logs.into_iter()
            .filter(|l| !l.removed.unwrap_or(false))
            .map(eth_log_from_rpc_log)
            .collect()
    }

    /// Builds a signer bound to `private_key`, for submitting transactions
    /// on behalf of one local account.
    pub fn signer_for(
        &self,
        private_key: &[u8; 32],
    ) -> Result<SignerMiddleware<Arc<Provider<Ws>>, LocalWallet>, EthAdapterError> {
        let wallet = LocalWallet::from_bytes(private_key)
            .map_err(|e| EthAdapterError::Decode(e.to_string()))?
            .with_chain_id(self.chain_id);
        Ok(SignerMiddleware::new(self.provider.clone(), wallet))
    }

    /// Submits a raw, pre-signed transaction and returns its hash once
    /// broadcast (not yet mined).
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<Hash32, EthAdapterError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| EthAdapterError::TransactionRejected(e.to_string()))?;
        Ok(Hash32(pending.tx_hash().0))
    }

    /// Recovers the uncompressed public key of the account that submitted
    /// `tx_hash`, needed the first time a counter-party's channel-opening
    /// transaction is observed and no public key has been recorded for them
    /// yet. Legacy (pre-EIP-1559), EIP-155-signed transactions only — this deployment's contracts
    /// predate EIP-1559 tooling, so every transaction this control plane ever submits or observes is of
    /// that form.
    pub async fn recover_tx_sender_public_key(
        &self,
        tx_hash: Hash32,
    ) -> Result<PublicKey65, EthAdapterError> {
        let tx = self
            .provider
            .get_transaction(H256(tx_hash.0))
            .await?
            .ok_or_else(|| EthAdapterError::Decode("transaction not found".into()))?;

        let sighash = legacy_eip155_sighash(&tx, self.chain_id);
        let recovery_byte = normalize_recovery_id(tx.v.as_u64(), self.chain_id)
            .ok_or_else(|| EthAdapterError::Decode("unrecognized signature v value".into()))?;

        let mut sig_bytes = [0u8; 64];
        tx.r.to_big_endian(&mut sig_bytes[0..32]);
        tx.s.to_big_endian(&mut sig_bytes[32..64]);
        let sig = RecoverableSignature::from_slice(&sig_bytes)
            .map_err(|e| EthAdapterError::Decode(format!("bad transaction signature: {e}")))?;
        let recid = RecoveryId::from_byte(recovery_byte)
            .ok_or_else(|| EthAdapterError::Decode("invalid recovery id".into()))?;
        let verifying_key = VerifyingKey::recover_from_prehash(sighash.as_bytes(), &sig, recid)
            .map_err(|e| EthAdapterError::Decode(format!("public key recovery failed: {e}")))?;
        let encoded = verifying_key.to_encoded_point(false);
        PublicKey65::from_slice(encoded.as_bytes())
            .map_err(|e| EthAdapterError::Decode(format!("recovered key has unexpected shape: {e}")))
    }

    /// Builds an unsigned, chain-id-bound transaction request to one of the
    /// two tracked contracts.
    pub fn build_contract_call(
        &self,
        to: Address,
        data: Vec<u8>,
        gas_price: u64,
        gas_limit: u64,
    ) -> TransactionRequest {
        TransactionRequest::new()
            .to(to)
            .data(data)
            .gas_price(gas_price)
            .gas(gas_limit)
            .chain_id(self.chain_id)
    }
}

/// The EIP-155 signing preimage hash of a legacy transaction: Keccak-256 of
/// `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`.
fn legacy_eip155_sighash(tx: &ethers::types::Transaction, chain_id: u64) -> H256 {
    let mut stream = RlpStream::new();
    stream.begin_list(9);
    stream.append(&tx.nonce);
    stream.append(&tx.gas_price.unwrap_or_default());
    stream.append(&tx.gas);
    match tx.to {
        Some(to) => stream.append(&to),
        None => stream.append_empty_data(),
    };
    stream.append(&tx.value);
    stream.append(&tx.input.to_vec());
    stream.append(&chain_id);
    stream.append(&0u8);
    stream.append(&0u8);
    let digest = svcchan_crypto::hash::keccak256(&stream.out());
    H256(digest.0)
}

/// `v = {27, 28}` is a pre-EIP-155 legacy signature; `v = chain_id*2 + 35/36`
/// is EIP-155. Either way the recovery id is `0` or `1`.
fn normalize_recovery_id(v: u64, chain_id: u64) -> Option<u8> {
    if v == 27 || v == 28 {
        return Some((v - 27) as u8);
    }
    let base = chain_id * 2 + 35;
    if v == base || v == base + 1 {
        return Some((v - base) as u8);
    }
    None
}

fn eth_log_from_rpc_log(log: Log) -> Result<EthLog, EthAdapterError> {
    let topics: Vec<Hash32> = log.topics.iter().map(|t| Hash32(t.0)).collect();
    if topics.is_empty() || topics.len() > 4 {
        return Err(EthAdapterError::Decode(format!(
            "log carries {} topics, expected 1..=4",
            topics.len()
        )));
    }
    let block_number = log
        .block_number
        .ok_or_else(|| EthAdapterError::Decode("log missing block number".into()))?
        .as_u64();
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| EthAdapterError::Decode("log missing transaction hash".into()))?;
    Ok(EthLog {
        id: svcchan_types::ids::EthLogId::new(),
        tx_hash: Hash32(tx_hash.0),
        block_number,
        address: EthAddress(log.address.0),
        data: svcchan_types::model::Blob(log.data.to_vec()),
        topics,
        job: None,
        failures: 0,
        ignore: false,
    })
}
