//! Error type for cryptographic operations.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

/// Errors produced by key storage, hashing, or signing operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key, signature, or encrypted blob had an unexpected length or shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The key-file header names an unsupported format version.
    #[error("unsupported key format: {0}")]
    Unsupported(String),
    /// Argon2 derivation, AEAD encryption, or ECDSA signing failed.
    #[error("operation failed: {0}")]
    OperationFailed(String),
    /// AEAD authentication failed: wrong passphrase or corrupted ciphertext.
    #[error("decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,
    /// A signature failed to verify, or a public key could not be recovered.
    #[error("signature verification failed")]
    VerificationFailed,
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            CryptoError::InvalidInput(_) => "CRYPTO_INVALID_INPUT",
            CryptoError::Unsupported(_) => "CRYPTO_UNSUPPORTED",
            CryptoError::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
            CryptoError::DecryptionFailed => "CRYPTO_DECRYPT_FAILED",
            CryptoError::VerificationFailed => "CRYPTO_VERIFY_FAILED",
        }
    }
}
