#![forbid(unsafe_code)]

//! Durable job queue for the svcchan control plane: a collector task plus N per-entity-affine
//! worker tasks, backed by [`svcchan_store::Store`].

pub mod error;
pub mod handler;
pub mod metrics;
pub mod queue;
pub mod registry;

pub use error::QueueError;
pub use handler::JobHandler;
pub use queue::{ProcessHandle, Queue, QueueConfig};
pub use registry::HandlerRegistry;
