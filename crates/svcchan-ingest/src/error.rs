//! Error type for the log ingestor.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

/// Errors produced while polling the node or persisting logs.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The node could not be reached or rejected a filter.
    #[error(transparent)]
    Eth(#[from] svcchan_eth::EthAdapterError),
    /// The store could not be read or written.
    #[error(transparent)]
    Store(#[from] svcchan_store::StoreError),
}

impl ErrorCode for IngestError {
    fn code(&self) -> &'static str {
        match self {
            IngestError::Eth(e) => e.code(),
            IngestError::Store(e) => e.code(),
        }
    }
}
