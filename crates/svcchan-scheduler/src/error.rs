//! Error type for the event scheduler.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

/// Errors produced while translating `EthLog` rows into jobs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The store could not be read or written.
    #[error(transparent)]
    Store(#[from] svcchan_store::StoreError),
    /// The job queue rejected an enqueue attempt for a reason other than a
    /// benign duplicate (which the scheduler swallows, ).
    #[error(transparent)]
    Queue(#[from] svcchan_queue::QueueError),
}

impl ErrorCode for SchedulerError {
    fn code(&self) -> &'static str {
        match self {
            SchedulerError::Store(e) => e.code(),
            SchedulerError::Queue(e) => e.code(),
        }
    }
}
