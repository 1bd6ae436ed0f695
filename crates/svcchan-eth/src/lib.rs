#![forbid(unsafe_code)]

//! Typed Ethereum JSON-RPC adapter for the svcchan control plane: block
//! head and balance lookups, the three log filters the ingestor runs every
//! iteration, and raw transaction submission.

pub mod abi;
pub mod adapter;
pub mod error;
pub mod filters;

pub use adapter::EthAdapter;
pub use error::EthAdapterError;
