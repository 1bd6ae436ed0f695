#![forbid(unsafe_code)]

//! Endpoint-message service: builds the per-channel session credential, wraps it in the signed
//! sealed message format names, and hands the result back to the caller to persist and publish.
//! Invoked from inside the worker's endpoint-credential job handler.

pub mod credential;
pub mod error;

pub use credential::{build_sealed_credential, generate_session_credential, SealedCredential, SessionCredential};
pub use error::EndpointError;
