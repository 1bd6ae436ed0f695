//! The job queue's persistence contract. This module only implements the storage side: insert,
//! collect, fetch, and terminal-state transitions. Scheduling (worker affinity, retry timing) lives
//! in `svcchan-queue`, which calls through here.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use svcchan_types::model::{Job, JobCreator, RelatedType};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Inserts a new active job. Fails with [`StoreError::Duplicate`] when `duplicated` is `false` and
    /// an active job of the same `(related_id, job_type)` already exists.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_job(
        &self,
        job_type: &str,
        related_type: RelatedType,
        related_id: Uuid,
        created_by: JobCreator,
        payload: serde_json::Value,
        duplicated: bool,
    ) -> Result<Uuid, StoreError> {
        let mut tx = self.pool().begin().await?;

        if !duplicated {
            let existing = sqlx::query(
                "SELECT id FROM job WHERE related_id = $1 AND job_type = $2 AND status = 'active' LIMIT 1",
            )
            .bind(related_id)
            .bind(job_type)
            .fetch_optional(&mut *tx)
            .await?;
            if existing.is_some() {
                return Err(StoreError::Duplicate {
                    related_id,
                    job_type: job_type.to_string(),
                });
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO job (id, job_type, status, related_type, related_id, created_at, \
             not_before, created_by, try_count, payload) \
             VALUES ($1, $2, 'active', $3, $4, $5, $5, $6, 0, $7)",
        )
        .bind(id)
        .bind(job_type)
        .bind(related_type_str(related_type))
        .bind(related_id)
        .bind(now)
        .bind(creator_str(created_by))
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Collects up to `limit` active, eligible jobs ordered by `(related_id,
    /// created_at)`, returning each job's own id paired with its
    /// `related_id` so the caller can route by the latter.
    pub async fn collect_active_job_ids(&self, limit: i64) -> Result<Vec<(Uuid, Uuid)>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, related_id FROM job WHERE status = 'active' AND not_before <= now() \
             ORDER BY related_id, created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("id"), r.get("related_id")))
            .collect())
    }

    /// Refetches a single job by id, e.g. because it may have been canceled
    /// since collection.
    pub async fn fetch_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(
            "SELECT id, job_type, status, related_type, related_id, created_at, not_before, \
             created_by, try_count, payload FROM job WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(job_from_row))
    }

    /// Marks a job `done`.
    pub async fn complete_job(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE job SET status = 'done' WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Marks a job `failed` (retry budget exhausted).
    pub async fn fail_job(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE job SET status = 'failed' WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Increments `try_count` and reschedules a job for `not_before`,
    /// leaving `status = active`. When `bump_try_count` is `false` (an
    /// unbounded, `try_limit = 0` job type), `try_count` is left untouched.
    pub async fn retry_job(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        bump_try_count: bool,
    ) -> Result<(), StoreError> {
        if bump_try_count {
            sqlx::query("UPDATE job SET try_count = try_count + 1, not_before = $2 WHERE id = $1")
                .bind(id)
                .bind(not_before)
                .execute(self.pool())
                .await?;
        } else {
            sqlx::query("UPDATE job SET not_before = $2 WHERE id = $1")
                .bind(id)
                .bind(not_before)
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }

    /// Locks the job row and, if it is still `active`, leaves it untouched
    /// and returns `true`; if it was concurrently `canceled`, returns
    /// `false` so the caller can propagate the cancellation instead of
    /// overwriting it with a terminal/retry status.
    pub async fn confirm_still_active(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool().begin().await?;
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM job WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(status.as_deref() == Some("active"))
    }
}

fn related_type_str(t: RelatedType) -> &'static str {
    match t {
        RelatedType::Offering => "offering",
        RelatedType::Channel => "channel",
        RelatedType::Endpoint => "endpoint",
        RelatedType::Account => "account",
    }
}

fn creator_str(c: JobCreator) -> &'static str {
    match c {
        JobCreator::User => "user",
        JobCreator::BillingChecker => "billing_checker",
        JobCreator::BcMonitor => "bc_monitor",
        JobCreator::Task => "task",
    }
}

fn job_from_row(row: sqlx::postgres::PgRow) -> Job {
    use sqlx::Row as _;
    let job_type: String = row.get("job_type");
    let status_str: String = row.get("status");
    let related_type_str: String = row.get("related_type");
    let created_by_str: String = row.get("created_by");
    Job {
        id: row.get::<Uuid, _>("id").into(),
        job_type,
        status: parse_job_status(&status_str),
        related_type: parse_related_type(&related_type_str),
        related_id: row.get("related_id"),
        created_at: row.get("created_at"),
        not_before: row.get("not_before"),
        created_by: parse_job_creator(&created_by_str),
        try_count: row.get::<i32, _>("try_count") as u32,
        payload: row.get("payload"),
    }
}

fn parse_job_status(s: &str) -> svcchan_types::jobs::JobStatus {
    use svcchan_types::jobs::JobStatus::*;
    match s {
        "done" => Done,
        "failed" => Failed,
        "canceled" => Canceled,
        _ => Active,
    }
}

fn parse_related_type(s: &str) -> RelatedType {
    match s {
        "channel" => RelatedType::Channel,
        "endpoint" => RelatedType::Endpoint,
        "account" => RelatedType::Account,
        _ => RelatedType::Offering,
    }
}

fn parse_job_creator(s: &str) -> JobCreator {
    match s {
        "billing_checker" => JobCreator::BillingChecker,
        "bc_monitor" => JobCreator::BcMonitor,
        "task" => JobCreator::Task,
        _ => JobCreator::User,
    }
}

#[cfg(all(test, feature = "test-support"))]
mod db_tests {
    use super::*;
    use crate::Store;

    #[sqlx::test]
    async fn add_job_rejects_duplicate_when_not_flagged(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool);
        let related_id = Uuid::new_v4();
        let first = store
            .add_job(
                "agent-pre-service-suspend",
                RelatedType::Channel,
                related_id,
                JobCreator::BillingChecker,
                serde_json::json!({}),
                false,
            )
            .await
            .unwrap();
        let second = store
            .add_job(
                "agent-pre-service-suspend",
                RelatedType::Channel,
                related_id,
                JobCreator::BillingChecker,
                serde_json::json!({}),
                false,
            )
            .await;
        assert!(matches!(second, Err(StoreError::Duplicate { .. })));
        assert!(store.fetch_job(first).await.unwrap().is_some());
    }

    #[sqlx::test]
    async fn add_job_allows_duplicate_when_flagged(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool);
        let related_id = Uuid::new_v4();
        for _ in 0..2 {
            store
                .add_job(
                    "client-pre-channel-create",
                    RelatedType::Account,
                    related_id,
                    JobCreator::User,
                    serde_json::json!({}),
                    true,
                )
                .await
                .unwrap();
        }
        let collected = store.collect_active_job_ids(10).await.unwrap();
        assert_eq!(collected.iter().filter(|(_, r)| *r == related_id).count(), 2);
    }

    #[sqlx::test]
    async fn collect_active_job_ids_skips_not_yet_due_jobs(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool.clone());
        let due = store
            .add_job(
                "client-pre-channel-create",
                RelatedType::Account,
                Uuid::new_v4(),
                JobCreator::User,
                serde_json::json!({}),
                false,
            )
            .await
            .unwrap();
        let not_due_related = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO job (id, job_type, status, related_type, related_id, created_at, \
             not_before, created_by, try_count, payload) \
             VALUES ($1, 'client-pre-channel-create', 'active', 'account', $2, now(), \
             now() + interval '1 hour', 'user', 0, '{}')",
        )
        .bind(Uuid::new_v4())
        .bind(not_due_related)
        .execute(&pool)
        .await
        .unwrap();
        let collected = store.collect_active_job_ids(10).await.unwrap();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].0, due);
    }
}
