//! The handler trait job types implement; registered into a [`crate::registry::HandlerRegistry`]
//! and invoked by the queue's workers.

use async_trait::async_trait;
use svcchan_types::model::Job;

/// Handles one job type. Implementations live in `svcchan-worker`.
///
/// `Ok(())` marks the job done. `Err(reason)` is a retriable failure;
/// the queue applies the job type's `try_limit`/`try_period` to decide whether to reschedule or
/// mark it `failed`. A handler must not itself decide terminal failure versus retry — that is the
/// queue's job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs this job type's handler logic against `job`.
    async fn handle(&self, job: &Job) -> Result<(), String>;
}
