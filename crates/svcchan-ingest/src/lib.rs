#![forbid(unsafe_code)]

//! Blockchain log ingestor for the svcchan control plane: polls the node's agent, client, and
//! offering log filters on a timer and persists new [`svcchan_types::model::EthLog`] rows for the
//! event scheduler to translate into jobs.

pub mod error;
pub mod ingestor;
pub mod metrics;

pub use error::IngestError;
pub use ingestor::{Ingestor, IngestorConfig};
