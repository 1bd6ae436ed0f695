#![forbid(unsafe_code)]

//! Event scheduler for the svcchan control plane: turns persisted [`svcchan_types::model::EthLog`]
//! rows into queued jobs via a dispatch table keyed on the log's classified event kind.

pub mod error;
pub mod scheduler;

pub use error::SchedulerError;
pub use scheduler::{Scheduler, SchedulerConfig};
