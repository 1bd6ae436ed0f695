//! Error type for the Ethereum adapter.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

/// Errors produced while talking to the Ethereum node or its contracts.
#[derive(Debug, Error)]
pub enum EthAdapterError {
    /// The JSON-RPC transport returned an error or could not be reached.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// A value received from chain could not be decoded into our types.
    #[error("decode error: {0}")]
    Decode(String),
    /// A submitted transaction was rejected before being broadcast.
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),
    /// The caller's account has insufficient on-chain balance for the
    /// requested operation.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
}

impl ErrorCode for EthAdapterError {
    fn code(&self) -> &'static str {
        match self {
            EthAdapterError::Rpc(_) => "ETH_RPC",
            EthAdapterError::Decode(_) => "ETH_DECODE",
            EthAdapterError::TransactionRejected(_) => "ETH_TX_REJECTED",
            EthAdapterError::InsufficientBalance(_) => "ETH_INSUFFICIENT_BALANCE",
        }
    }
}

impl From<ethers::providers::ProviderError> for EthAdapterError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        EthAdapterError::Rpc(e.to_string())
    }
}
