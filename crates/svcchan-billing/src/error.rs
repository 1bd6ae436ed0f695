//! Error type for the billing monitors.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Store(#[from] svcchan_store::StoreError),
    #[error(transparent)]
    Crypto(#[from] svcchan_crypto::CryptoError),
    #[error("cheque request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel {0} has no account on file to decrypt its signing key")]
    NoLocalAccount(uuid::Uuid),
}

impl ErrorCode for BillingError {
    fn code(&self) -> &'static str {
        match self {
            BillingError::Store(e) => e.code(),
            BillingError::Crypto(e) => e.code(),
            BillingError::Request(_) => "BILLING_REQUEST_FAILED",
            BillingError::NoLocalAccount(_) => "BILLING_NO_LOCAL_ACCOUNT",
        }
    }
}
