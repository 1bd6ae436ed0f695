//! Cross-cutting error types shared by the rest of the workspace.

use thiserror::Error;

/// Assigns a stable, machine-readable string code to an error variant so
/// that log lines and metrics labels survive refactors of the error message
/// text.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while constructing or validating core data-model values
/// (outside of any particular storage backend).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A caller-supplied value failed validation (e.g. negative interval,
    /// malformed id). Never retried.
    #[error("invalid input: {0}")]
    Input(String),

    /// A state-machine transition was rejected because the entity was not in
    /// an allowed starting state.
    #[error("bad state: {0}")]
    BadState(String),

    /// Decoding a persisted or wire payload failed.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Input(_) => "CORE_INPUT",
            Self::BadState(_) => "CORE_BAD_STATE",
            Self::Decode(_) => "CORE_DECODE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(CoreError::Input("x".into()).code(), "CORE_INPUT");
        assert_eq!(CoreError::BadState("x".into()).code(), "CORE_BAD_STATE");
        assert_eq!(CoreError::Decode("x".into()).code(), "CORE_DECODE");
    }
}
