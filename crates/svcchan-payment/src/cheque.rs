//! The `/pay` handler: six ordered validation steps over a posted cheque, ending in the same
//! monotonic `receipt_balance` update the client billing monitor uses on its own successful POST.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use svcchan_types::model::{ChannelStatus, EthAddress, Hash32};

use crate::error::PaymentError;
use crate::metrics;
use crate::router::AppState;

/// Wire shape of the cheque POST body: addresses and hashes travel as `"0x"`-prefixed hex, not this
/// crate's base64 `Serialize` form, since the wire format is a plain external contract rather than
/// an internal payload.
#[derive(Debug, Deserialize)]
pub struct ChequeRequest {
    #[serde(rename = "agentAddress")]
    pub agent_address: String,
    #[serde(rename = "openBlockNum")]
    pub open_block_num: u64,
    #[serde(rename = "offeringHash")]
    pub offering_hash: String,
    pub balance: u64,
    #[serde(rename = "balanceMsgSig")]
    pub balance_msg_sig: String,
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
}

fn parse_hex(field: &str, value: &str) -> Result<Vec<u8>, PaymentError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| PaymentError::InvalidPayload(format!("field {field} is not hex: {e}")))
}

fn parse_address(field: &str, value: &str) -> Result<EthAddress, PaymentError> {
    let bytes = parse_hex(field, value)?;
    EthAddress::from_slice(&bytes).map_err(|e| PaymentError::InvalidPayload(format!("field {field}: {e}")))
}

fn parse_hash(field: &str, value: &str) -> Result<Hash32, PaymentError> {
    let bytes = parse_hex(field, value)?;
    Hash32::from_slice(&bytes).map_err(|e| PaymentError::InvalidPayload(format!("field {field}: {e}")))
}

/// `POST /pay`: accepts a client-issued cheque and updates the channel's
/// proved balance if every check passes.
pub async fn handle(State(state): State<Arc<AppState>>, Json(req): Json<ChequeRequest>) -> Result<(), PaymentError> {
    let start = Instant::now();
    let result = process(&state, &req).await;
    let outcome = match &result {
        Ok(()) => "accepted",
        Err(PaymentError::InvalidPayload(_)) => "invalid_payload",
        Err(PaymentError::NoChannel) => "no_channel",
        Err(PaymentError::Closed) => "closed",
        Err(PaymentError::InvalidAmount) => "invalid_amount",
        Err(PaymentError::InvalidSignature) => "invalid_signature",
        Err(_) => "internal_error",
    };
    metrics::observe_outcome(outcome, start.elapsed().as_secs_f64());
    result
}

async fn process(state: &AppState, req: &ChequeRequest) -> Result<(), PaymentError> {
    // Step 1 happened in the extractor: a malformed body never reaches here.
    let agent = parse_address("agentAddress", &req.agent_address)?;
    let offering_hash = parse_hash("offeringHash", &req.offering_hash)?;
    let contract = parse_address("contractAddress", &req.contract_address)?;
    let sig_bytes = parse_hex("balanceMsgSig", &req.balance_msg_sig)?;
    if sig_bytes.len() != 65 {
        return Err(PaymentError::InvalidPayload("balanceMsgSig must be 65 bytes".into()));
    }
    let mut sig = [0u8; 65];
    sig.copy_from_slice(&sig_bytes);

    // Step 2.
    let channel = state
        .store
        .find_channel_by_offering_agent_block(offering_hash, agent, req.open_block_num)
        .await?
        .ok_or(PaymentError::NoChannel)?;

    // Step 3.
    if channel.channel_status != ChannelStatus::Active {
        return Err(PaymentError::Closed);
    }

    // Step 4.
    if !(req.balance > channel.receipt_balance && req.balance <= channel.total_deposit) {
        return Err(PaymentError::InvalidAmount);
    }

    // Step 5.
    let client = state
        .store
        .get_user_by_address(channel.client)
        .await?
        .ok_or(PaymentError::InvalidSignature)?;
    let client_public_key = client.public_key.ok_or(PaymentError::InvalidSignature)?;
    let hash = svcchan_crypto::proof::balance_proof_hash(agent, req.open_block_num, offering_hash, req.balance, contract);
    let signature = svcchan_crypto::sign::Signature(sig);
    if !svcchan_crypto::sign::verify(&hash, &signature, &client_public_key)? {
        return Err(PaymentError::InvalidSignature);
    }

    // Step 6.
    state
        .store
        .raise_receipt_balance(channel.id.as_uuid(), req.balance as i64, &sig)
        .await?;
    Ok(())
}
