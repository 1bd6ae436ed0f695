//! Error type for the matching-server (SOMC) client.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

/// Errors produced while talking to the matching server.
#[derive(Debug, Error, Clone)]
pub enum SomcError {
    /// The websocket transport is down; the client is between connection
    /// attempts or was closed while the request was in flight.
    #[error("transport unavailable: {0}")]
    Transport(String),
    /// A frame could not be decoded as the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server replied with a JSON-RPC `error` object.
    #[error("matching server rejected request: {message} (code {code})")]
    Rpc {
        /// The JSON-RPC error code.
        code: i64,
        /// The JSON-RPC error message.
        message: String,
    },
    /// A `getOfferings` entry's declared hash did not match
    /// Keccak-256(data).
    #[error("offering hash mismatch")]
    HashMismatch,
    /// The request was not answered before the caller's deadline.
    #[error("request timed out")]
    Timeout,
    /// The client was closed.
    #[error("client closed")]
    Closed,
}

impl ErrorCode for SomcError {
    fn code(&self) -> &'static str {
        match self {
            SomcError::Transport(_) => "SOMC_TRANSPORT",
            SomcError::Protocol(_) => "SOMC_PROTOCOL",
            SomcError::Rpc { .. } => "SOMC_RPC",
            SomcError::HashMismatch => "SOMC_HASH_MISMATCH",
            SomcError::Timeout => "SOMC_TIMEOUT",
            SomcError::Closed => "SOMC_CLOSED",
        }
    }
}
