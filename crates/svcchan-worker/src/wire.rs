//! Parses the `0x`-prefixed hex strings the event scheduler writes into job
//! payloads back into fixed-width types. These are plain `Display`-formatted addresses/hashes, not
//! the base64 `serde` wire format [`EthAddress`]/[`Hash32`] use for their own (de)serialization.

use svcchan_types::model::{EthAddress, Hash32};

use crate::error::WorkerError;

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, WorkerError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| WorkerError::InvalidJob(format!("payload field {field} is not hex: {e}")))
}

pub fn payload_str<'a>(payload: &'a serde_json::Value, field: &str) -> Result<&'a str, WorkerError> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| WorkerError::InvalidJob(format!("payload missing string field {field}")))
}

pub fn payload_u64(payload: &serde_json::Value, field: &str) -> Result<u64, WorkerError> {
    payload
        .get(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| WorkerError::InvalidJob(format!("payload missing numeric field {field}")))
}

pub fn payload_address(payload: &serde_json::Value, field: &str) -> Result<EthAddress, WorkerError> {
    let raw = payload_str(payload, field)?;
    EthAddress::from_slice(&decode_hex(field, raw)?)
        .map_err(|e| WorkerError::InvalidJob(format!("payload field {field}: {e}")))
}

pub fn payload_hash32(payload: &serde_json::Value, field: &str) -> Result<Hash32, WorkerError> {
    let raw = payload_str(payload, field)?;
    Hash32::from_slice(&decode_hex(field, raw)?).map_err(|e| WorkerError::InvalidJob(format!("payload field {field}: {e}")))
}
