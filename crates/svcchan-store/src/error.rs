//! Error type for the data store.

use svcchan_types::error::ErrorCode;
use thiserror::Error;

/// Errors produced by the data store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller supplied an invalid argument (bad id, negative interval).
    #[error("invalid input: {0}")]
    Input(String),
    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A state-machine transition was rejected.
    #[error("bad state: {0}")]
    BadState(String),
    /// An active job already exists for a job type whose `duplicated` flag forbids more than one.
    #[error("duplicate job for ({related_id}, {job_type})")]
    Duplicate {
        /// The entity the duplicate job would have targeted.
        related_id: uuid::Uuid,
        /// The job type tag that collided.
        job_type: String,
    },
    /// An active job of a different type already exists and `cancelOthers` was not set.
    #[error("channel busy: an active job already exists")]
    Busy,
    /// The underlying database connection or query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Schema migration failed on connect.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            StoreError::Input(_) => "STORE_INPUT",
            StoreError::NotFound(_) => "STORE_NOT_FOUND",
            StoreError::BadState(_) => "STORE_BAD_STATE",
            StoreError::Duplicate { .. } => "STORE_DUPLICATE",
            StoreError::Busy => "STORE_BUSY",
            StoreError::Database(_) => "STORE_DATABASE",
            StoreError::Migration(_) => "STORE_MIGRATION",
        }
    }
}

/// `true` if this error represents a transient I/O failure that a caller
/// (worker, monitor) should retry rather than treat as a permanent rejection.
pub fn is_transient(err: &StoreError) -> bool {
    matches!(err, StoreError::Database(_))
}
