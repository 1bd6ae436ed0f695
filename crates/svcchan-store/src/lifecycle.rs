//! `alterServiceStatus` and the channel balance invariants it protects.

use chrono::Utc;
use uuid::Uuid;

use svcchan_types::model::{Channel, EthAddress, ServiceStatus};

use crate::error::StoreError;
use crate::Store;

/// Everything needed to record a just-observed channel-creation event
/// before the endpoint-credential flow fills in `username`/`password`.
pub struct NewChannel {
    pub id: Uuid,
    pub agent: EthAddress,
    pub client: EthAddress,
    pub offering: Uuid,
    pub block: u64,
    pub total_deposit: u64,
}

impl Store {
    /// Inserts a freshly observed channel, `channel_status=active`,
    /// `service_status=pending`, with a random placeholder password that
    /// `set_channel_credentials` overwrites once the endpoint message is
    /// built.
    pub async fn insert_channel(&self, channel: NewChannel) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO channel (id, agent, client, offering, block, total_deposit, \
             receipt_balance, receipt_signature, channel_status, service_status, \
             service_status_changed_at, username, password_hash, password_salt) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, NULL, 'active', 'pending', now(), $7, ''::bytea, ''::bytea)",
        )
        .bind(channel.id)
        .bind(channel.agent.0.as_slice())
        .bind(channel.client.0.as_slice())
        .bind(channel.offering)
        .bind(channel.block as i64)
        .bind(channel.total_deposit as i64)
        .bind(channel.id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Loads a channel by id.
    pub async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, StoreError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, agent, client, offering, block, total_deposit, receipt_balance, \
             receipt_signature, channel_status, service_status, service_status_changed_at, \
             username, password_hash, password_salt FROM channel WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(ChannelRow::into_channel))
    }

    /// `alterServiceStatus(id, creator, jobType, checkedType, allowedFromSet, cancelOthers)`
    /// from: within one transaction, lock the channel row, verify the current service status is in
    /// `allowed_from`, enforce the duplicate/busy rule, optionally cancel other active jobs, and insert
    /// the new job.
    #[allow(clippy::too_many_arguments)]
    pub async fn alter_service_status(
        &self,
        channel_id: Uuid,
        created_by: svcchan_types::model::JobCreator,
        job_type: &str,
        checked_type: Option<&str>,
        allowed_from: &[ServiceStatus],
        cancel_others: bool,
        payload: serde_json::Value,
    ) -> Result<Uuid, StoreError> {
        let mut tx = self.pool().begin().await?;

        let current_status: String =
            sqlx::query_scalar("SELECT service_status FROM channel WHERE id = $1 FOR UPDATE")
                .bind(channel_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("channel {channel_id}")))?;
        let current = parse_service_status(&current_status);
        if !allowed_from.contains(&current) {
            return Err(StoreError::BadState(format!(
                "channel {channel_id} service_status={current:?} not in {allowed_from:?}"
            )));
        }

        if let Some(checked) = checked_type {
            let dup = sqlx::query(
                "SELECT id FROM job WHERE related_id = $1 AND job_type = $2 AND status = 'active' LIMIT 1",
            )
            .bind(channel_id)
            .bind(checked)
            .fetch_optional(&mut *tx)
            .await?;
            if dup.is_some() {
                return Err(StoreError::Duplicate {
                    related_id: channel_id,
                    job_type: checked.to_string(),
                });
            }
        } else {
            let any_active = sqlx::query(
                "SELECT id FROM job WHERE related_id = $1 AND status = 'active' LIMIT 1",
            )
            .bind(channel_id)
            .fetch_optional(&mut *tx)
            .await?;
            if any_active.is_some() {
                return Err(StoreError::Busy);
            }
        }

        if cancel_others {
            sqlx::query("UPDATE job SET status = 'canceled' WHERE related_id = $1 AND status = 'active'")
                .bind(channel_id)
                .execute(&mut *tx)
                .await?;
        }

        let job_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO job (id, job_type, status, related_type, related_id, created_at, \
             not_before, created_by, try_count, payload) \
             VALUES ($1, $2, 'active', 'channel', $3, $4, $4, $5, 0, $6)",
        )
        .bind(job_id)
        .bind(job_type)
        .bind(channel_id)
        .bind(now)
        .bind(creator_str(created_by))
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE channel SET service_status_changed_at = $2 WHERE id = $1")
            .bind(channel_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(job_id)
    }

    /// Adds `added_deposit` to a channel's `total_deposit`.
    pub async fn top_up_channel(&self, id: Uuid, added_deposit: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE channel SET total_deposit = total_deposit + $2 WHERE id = $1")
            .bind(id)
            .bind(added_deposit)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Conditionally raises `receipt_balance`, guarding against a stale
    /// cheque decreasing it. Returns `true` if the row was updated.
    pub async fn raise_receipt_balance(
        &self,
        id: Uuid,
        new_balance: i64,
        signature: &[u8],
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE channel SET receipt_balance = $2, receipt_signature = $3 \
             WHERE id = $1 AND receipt_balance < $2",
        )
        .bind(id)
        .bind(new_balance)
        .bind(signature)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Locates the channel a `ChannelCreated`/`ChannelToppedUp`-family event
    /// refers to, by the triple an on-chain block carries: the offering it
    /// was opened against, the two parties, and the block it was opened at.
    pub async fn find_channel_by_offering_agent_client_block(
        &self,
        offering_hash: svcchan_types::model::Hash32,
        agent: svcchan_types::model::EthAddress,
        client: svcchan_types::model::EthAddress,
        block: u64,
    ) -> Result<Option<Channel>, StoreError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT c.id, c.agent, c.client, c.offering, c.block, c.total_deposit, \
             c.receipt_balance, c.receipt_signature, c.channel_status, c.service_status, \
             c.service_status_changed_at, c.username, c.password_hash, c.password_salt \
             FROM channel c JOIN offering o ON o.id = c.offering \
             WHERE o.hash = $1 AND c.agent = $2 AND c.client = $3 AND c.block = $4",
        )
        .bind(offering_hash.0.as_slice())
        .bind(agent.0.as_slice())
        .bind(client.0.as_slice())
        .bind(block as i64)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(ChannelRow::into_channel))
    }

    /// Locates the channel a payment cheque names, by `(offering_hash,
    /// agent, open_block_number)` alone: the payment receiver is not told which client is paying, only
    /// which channel.
    pub async fn find_channel_by_offering_agent_block(
        &self,
        offering_hash: svcchan_types::model::Hash32,
        agent: svcchan_types::model::EthAddress,
        block: u64,
    ) -> Result<Option<Channel>, StoreError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT c.id, c.agent, c.client, c.offering, c.block, c.total_deposit, \
             c.receipt_balance, c.receipt_signature, c.channel_status, c.service_status, \
             c.service_status_changed_at, c.username, c.password_hash, c.password_salt \
             FROM channel c JOIN offering o ON o.id = c.offering \
             WHERE o.hash = $1 AND c.agent = $2 AND c.block = $3",
        )
        .bind(offering_hash.0.as_slice())
        .bind(agent.0.as_slice())
        .bind(block as i64)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(ChannelRow::into_channel))
    }

    /// Flips `channel_status` directly, bypassing the job/dedup machinery
    /// `alter_service_status` applies to `service_status`.
    pub async fn set_channel_status(
        &self,
        id: Uuid,
        status: svcchan_types::model::ChannelStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE channel SET channel_status = $2 WHERE id = $1")
            .bind(id)
            .bind(channel_status_str(status))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Flips `service_status` directly. Called by the worker handler that
    /// actually carries out a terminate/suspend/unsuspend job once
    /// `alter_service_status` has admitted it past the allowed-from and
    /// duplicate checks.
    pub async fn set_service_status(&self, id: Uuid, status: ServiceStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE channel SET service_status = $2 WHERE id = $1")
            .bind(id)
            .bind(service_status_str(status))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Resolves an on-chain offering hash to its local primary key, needed
    /// before enqueueing a job whose `related_id` must be the offering's
    /// row id rather than its hash.
    pub async fn find_offering_id_by_hash(
        &self,
        hash: svcchan_types::model::Hash32,
    ) -> Result<Option<Uuid>, StoreError> {
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM offering WHERE hash = $1")
            .bind(hash.0.as_slice())
            .fetch_optional(self.pool())
            .await?;
        Ok(id)
    }
}

fn creator_str(c: svcchan_types::model::JobCreator) -> &'static str {
    use svcchan_types::model::JobCreator::*;
    match c {
        User => "user",
        BillingChecker => "billing_checker",
        BcMonitor => "bc_monitor",
        Task => "task",
    }
}

fn parse_service_status(s: &str) -> ServiceStatus {
    use ServiceStatus::*;
    match s {
        "active" => Active,
        "suspended" => Suspended,
        "terminated" => Terminated,
        _ => Pending,
    }
}

fn service_status_str(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Pending => "pending",
        ServiceStatus::Active => "active",
        ServiceStatus::Suspended => "suspended",
        ServiceStatus::Terminated => "terminated",
    }
}

fn channel_status_str(status: svcchan_types::model::ChannelStatus) -> &'static str {
    use svcchan_types::model::ChannelStatus::*;
    match status {
        Pending => "pending",
        Active => "active",
        WaitCoop => "wait_coop",
        ClosedCoop => "closed_coop",
        WaitChallenge => "wait_challenge",
        InChallenge => "in_challenge",
        WaitUncoop => "wait_uncoop",
        ClosedUncoop => "closed_uncoop",
    }
}

fn parse_channel_status(s: &str) -> svcchan_types::model::ChannelStatus {
    use svcchan_types::model::ChannelStatus::*;
    match s {
        "active" => Active,
        "wait_coop" => WaitCoop,
        "closed_coop" => ClosedCoop,
        "wait_challenge" => WaitChallenge,
        "in_challenge" => InChallenge,
        "wait_uncoop" => WaitUncoop,
        "closed_uncoop" => ClosedUncoop,
        _ => Pending,
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: Uuid,
    agent: Vec<u8>,
    client: Vec<u8>,
    offering: Uuid,
    block: i64,
    total_deposit: i64,
    receipt_balance: i64,
    receipt_signature: Option<Vec<u8>>,
    channel_status: String,
    service_status: String,
    service_status_changed_at: chrono::DateTime<Utc>,
    username: String,
    password_hash: Vec<u8>,
    password_salt: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_round_trips_through_storage_strings() {
        for s in [
            ServiceStatus::Pending,
            ServiceStatus::Active,
            ServiceStatus::Suspended,
            ServiceStatus::Terminated,
        ] {
            let as_str = match s {
                ServiceStatus::Pending => "pending",
                ServiceStatus::Active => "active",
                ServiceStatus::Suspended => "suspended",
                ServiceStatus::Terminated => "terminated",
            };
            assert_eq!(parse_service_status(as_str), s);
        }
    }
}

#[cfg(all(test, feature = "test-support"))]
mod db_tests {
    use super::*;
    use crate::Store;

    async fn seed_channel(pool: &sqlx::PgPool) -> Uuid {
        let template = Uuid::new_v4();
        sqlx::query("INSERT INTO template (id, hash, raw, kind) VALUES ($1, $2, $3, 'access')")
            .bind(template)
            .bind(vec![0u8; 32])
            .bind(vec![0u8])
            .execute(pool)
            .await
            .unwrap();
        let product = Uuid::new_v4();
        sqlx::query("INSERT INTO product (id, access_template) VALUES ($1, $2)")
            .bind(product)
            .bind(template)
            .execute(pool)
            .await
            .unwrap();
        let offering = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO offering (id, agent, product, template, hash, unit_type, billing_type) \
             VALUES ($1, $2, $3, $4, $5, 'seconds', 'prepaid')",
        )
        .bind(offering)
        .bind(vec![1u8; 20])
        .bind(product)
        .bind(template)
        .bind(vec![2u8; 32])
        .execute(pool)
        .await
        .unwrap();
        let channel = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO channel (id, agent, client, offering, block, total_deposit) \
             VALUES ($1, $2, $3, $4, 0, 1000)",
        )
        .bind(channel)
        .bind(vec![1u8; 20])
        .bind(vec![3u8; 20])
        .bind(offering)
        .execute(pool)
        .await
        .unwrap();
        channel
    }

    #[sqlx::test]
    async fn alter_service_status_admits_allowed_from_state(pool: sqlx::PgPool) {
        let channel = seed_channel(&pool).await;
        let store = Store::from_pool(pool.clone());
        let job_id = store
            .alter_service_status(
                channel,
                svcchan_types::model::JobCreator::BcMonitor,
                "agent-after-channel-create",
                None,
                &[ServiceStatus::Pending],
                false,
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert!(store.fetch_job(job_id).await.unwrap().is_some());
    }

    #[sqlx::test]
    async fn alter_service_status_rejects_disallowed_from_state(pool: sqlx::PgPool) {
        let channel = seed_channel(&pool).await;
        let store = Store::from_pool(pool);
        let err = store
            .alter_service_status(
                channel,
                svcchan_types::model::JobCreator::BcMonitor,
                "agent-pre-service-terminate",
                None,
                &[ServiceStatus::Active],
                false,
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BadState(_)));
    }

    #[sqlx::test]
    async fn alter_service_status_rejects_checked_type_duplicate(pool: sqlx::PgPool) {
        let channel = seed_channel(&pool).await;
        let store = Store::from_pool(pool);
        store
            .alter_service_status(
                channel,
                svcchan_types::model::JobCreator::BcMonitor,
                "agent-pre-service-suspend",
                Some("agent-pre-service-suspend"),
                &[ServiceStatus::Pending],
                false,
                serde_json::json!({}),
            )
            .await
            .unwrap();
        let err = store
            .alter_service_status(
                channel,
                svcchan_types::model::JobCreator::BcMonitor,
                "agent-pre-service-suspend",
                Some("agent-pre-service-suspend"),
                &[ServiceStatus::Pending],
                false,
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }
}

impl ChannelRow {
    fn into_channel(self) -> Channel {
        use svcchan_types::model::{Blob, EthAddress, PasswordHash};
        Channel {
            id: self.id.into(),
            agent: EthAddress::from_slice(&self.agent).unwrap_or(EthAddress([0u8; 20])),
            client: EthAddress::from_slice(&self.client).unwrap_or(EthAddress([0u8; 20])),
            offering: self.offering.into(),
            block: self.block as u64,
            total_deposit: self.total_deposit as u64,
            receipt_balance: self.receipt_balance as u64,
            receipt_signature: self.receipt_signature.map(Blob),
            channel_status: parse_channel_status(&self.channel_status),
            service_status: parse_service_status(&self.service_status),
            service_status_changed_at: self.service_status_changed_at,
            username: self.username,
            password: PasswordHash {
                hash: Blob(self.password_hash),
                salt: Blob(self.password_salt),
            },
        }
    }
}
