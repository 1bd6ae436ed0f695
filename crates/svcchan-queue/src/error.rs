//! Error type for the job queue.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

/// Errors produced by [`crate::queue::Queue`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// The store rejected an `Add` because an active, non-duplicated job of
    /// the same `(related_id, job_type)` already exists.
    #[error("duplicate job for {related_id} of type {job_type}")]
    Duplicate {
        /// The entity the duplicate job targets.
        related_id: uuid::Uuid,
        /// The job type tag.
        job_type: String,
    },
    /// `add` was called with a tag outside the closed set in
    /// [`svcchan_types::jobs::JOB_TYPES`].
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    /// `process` was called while a previous call on the same instance was
    /// still running.
    #[error("queue is already processing")]
    AlreadyProcessing,
    /// A collected job's type has no registered handler; fatal, propagates
    /// to the `process` caller.
    #[error("no handler registered for job type {0}")]
    HandlerNotFound(String),
    /// The underlying data store failed.
    #[error(transparent)]
    Store(#[from] svcchan_store::StoreError),
}

impl ErrorCode for QueueError {
    fn code(&self) -> &'static str {
        match self {
            QueueError::Duplicate { .. } => "QUEUE_DUPLICATE",
            QueueError::UnknownJobType(_) => "QUEUE_UNKNOWN_JOB_TYPE",
            QueueError::AlreadyProcessing => "QUEUE_ALREADY_PROCESSING",
            QueueError::HandlerNotFound(_) => "QUEUE_HANDLER_NOT_FOUND",
            QueueError::Store(e) => e.code(),
        }
    }
}
