use svcchan_types::error::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Crypto(#[from] svcchan_crypto::CryptoError),
}

impl ErrorCode for EndpointError {
    fn code(&self) -> &'static str {
        match self {
            EndpointError::Crypto(e) => e.code(),
        }
    }
}
