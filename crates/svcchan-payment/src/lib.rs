#![forbid(unsafe_code)]

//! HTTP payment receiver for the svcchan control plane: validates and applies client-issued
//! cheques, and exposes a Prometheus `/metrics` surface for request outcomes and latency.

pub mod cheque;
pub mod error;
pub mod metrics;
pub mod router;

pub use error::PaymentError;
pub use router::{build, serve, AppState};
