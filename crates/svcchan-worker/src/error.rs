//! Error type for job handlers.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// `job.job_type`/`job.related_type` did not match what the handler
    /// expects, or a required related row was missing.
    #[error("invalid job: {0}")]
    InvalidJob(String),
    /// An explicit precondition (balance, gas) was not met.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// Not a failure: the handler did its work and is deliberately
    /// returning an error so the queue's retry path reschedules it, rather
    /// than completing and needing a separate timer to fire it again.
    #[error("rescheduled: {0}")]
    Rescheduled(String),
    #[error(transparent)]
    Store(#[from] svcchan_store::StoreError),
    #[error(transparent)]
    Eth(#[from] svcchan_eth::EthAdapterError),
    #[error(transparent)]
    Crypto(#[from] svcchan_crypto::CryptoError),
    #[error(transparent)]
    Queue(#[from] svcchan_queue::QueueError),
    #[error(transparent)]
    Somc(#[from] svcchan_somc::SomcError),
    #[error(transparent)]
    Endpoint(#[from] svcchan_endpoint::EndpointError),
}

impl ErrorCode for WorkerError {
    fn code(&self) -> &'static str {
        match self {
            WorkerError::InvalidJob(_) => "WORKER_INVALID_JOB",
            WorkerError::PreconditionFailed(_) => "WORKER_PRECONDITION_FAILED",
            WorkerError::Rescheduled(_) => "WORKER_RESCHEDULED",
            WorkerError::Store(e) => e.code(),
            WorkerError::Eth(e) => e.code(),
            WorkerError::Crypto(e) => e.code(),
            WorkerError::Queue(e) => e.code(),
            WorkerError::Somc(e) => e.code(),
            WorkerError::Endpoint(e) => e.code(),
        }
    }
}
