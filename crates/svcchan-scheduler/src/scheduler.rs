//! Translates persisted `EthLog` rows into queued jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use svcchan_queue::Queue;
use svcchan_store::Store;
use svcchan_types::events::{classify, EventKind};
use svcchan_types::jobs;
use svcchan_types::model::{EthAddress, EthLog, Hash32, JobCreator, RelatedType};

use crate::error::SchedulerError;

/// Tuning for the translation loop; `period` comes from
/// [`svcchan_types::config::SchedulerConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// How often to scan for untranslated logs.
    pub period: Duration,
    /// Maximum rows fetched per iteration.
    pub batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3),
            batch_size: 128,
        }
    }
}

/// Drives the event scheduler until cancelled.
pub struct Scheduler {
    store: Store,
    queue: Arc<Queue>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Builds a scheduler bound to `store`, enqueuing through `queue`.
    pub fn new(store: Store, queue: Arc<Queue>, config: SchedulerConfig) -> Self {
        Self { store, queue, config }
    }

    /// Runs the translation loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("event scheduler stopping");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().instrument(info_span!("scheduler_tick")).await {
                        warn!(error = %e, "scheduler tick failed, will retry next period");
                    }
                }
            }
        }
    }

    /// One translation iteration.
    async fn tick(&self) -> Result<(), SchedulerError> {
        let settings = self.store.load_dynamic_settings().await?;
        let logs = self
            .store
            .untranslated_logs(settings.max_event_retry, self.config.batch_size)
            .await?;

        for log in logs {
            match self.translate(&log).await {
                Ok(Outcome::Enqueued(job_id)) => {
                    self.store.mark_log_job(log.id.as_uuid(), job_id).await?;
                }
                Ok(Outcome::Ignored) => {
                    self.store.mark_log_ignored(log.id.as_uuid()).await?;
                }
                Ok(Outcome::Skipped) => {}
                Err(SchedulerError::Queue(svcchan_queue::QueueError::Duplicate { .. })) => {
                    debug!(log_id = %log.id, "duplicate job, marking log ignored");
                    self.store.mark_log_ignored(log.id.as_uuid()).await?;
                }
                Err(e) => {
                    warn!(log_id = %log.id, error = %e, "log translation failed, will retry");
                    self.store.increment_log_failures(log.id.as_uuid()).await?;
                }
            }
        }

        Ok(())
    }

    async fn translate(&self, log: &EthLog) -> Result<Outcome, SchedulerError> {
        let Some(topic0) = log.topics.first() else {
            return Ok(Outcome::Ignored);
        };
        let Some(kind) = classify(topic0) else {
            return Ok(Outcome::Ignored);
        };

        match kind {
            EventKind::TokenApproval | EventKind::TokenTransfer => self.translate_account_event(kind, log).await,
            EventKind::ChannelCreated
            | EventKind::ChannelToppedUp
            | EventKind::ChannelCloseRequested
            | EventKind::CooperativeClose
            | EventKind::UncooperativeClose => self.translate_channel_event(kind, log).await,
            EventKind::OfferingCreated | EventKind::OfferingPoppedUp => self.translate_offering_event(kind, log).await,
            EventKind::OfferingDeleted => self.translate_offering_deleted(log).await,
            EventKind::OfferingEndpoint => Ok(Outcome::Ignored),
        }
    }

    /// `token-approval`/`token-transfer`.
    async fn translate_account_event(&self, kind: EventKind, log: &EthLog) -> Result<Outcome, SchedulerError> {
        let Some(owner) = log.topics.get(1).map(address_from_topic) else {
            return Ok(Outcome::Ignored);
        };
        let Some(account_id) = self.store.find_account_id_by_address(owner).await? else {
            return Ok(Outcome::Skipped);
        };
        let job_type = match kind {
            EventKind::TokenApproval => jobs::PRE_ACCOUNT_ADD_BALANCE_APPROVE,
            EventKind::TokenTransfer => jobs::AFTER_ACCOUNT_ADD_BALANCE,
            _ => unreachable!(),
        };
        let amount = decode_words(&log.data.0).first().copied().unwrap_or(0);
        let payload = serde_json::json!({ "amount": amount });
        let job_id = self
            .queue
            .add(
                job_type,
                RelatedType::Account,
                account_id.as_uuid(),
                JobCreator::BcMonitor,
                payload,
            )
            .await?;
        Ok(Outcome::Enqueued(job_id))
    }

    /// Channel-scoped events.
    async fn translate_channel_event(&self, kind: EventKind, log: &EthLog) -> Result<Outcome, SchedulerError> {
        let (Some(agent), Some(client), Some(offering_hash)) = (
            log.topics.get(1).map(address_from_topic),
            log.topics.get(2).map(address_from_topic),
            log.topics.get(3).copied(),
        ) else {
            return Ok(Outcome::Ignored);
        };

        // `ChannelCreated` has no prior `Channel` row to locate: this is the
        // event that causes one to be created, with `job.related_id` as its
        // new primary key. Every other channel event instead locates the
        // row the earlier `ChannelCreated` job already inserted.
        if matches!(kind, EventKind::ChannelCreated) {
            let deposit = decode_words(&log.data.0).first().copied().unwrap_or(0);
            let channel_id = uuid::Uuid::new_v4();
            let payload = serde_json::json!({
                "agent": agent.to_string(),
                "client": client.to_string(),
                "offering_hash": offering_hash.to_string(),
                "deposit": deposit,
                "tx_hash": log.tx_hash.to_string(),
                "block": log.block_number,
            });
            let job_id = self
                .queue
                .add(
                    jobs::AGENT_AFTER_CHANNEL_CREATE,
                    RelatedType::Channel,
                    channel_id,
                    JobCreator::BcMonitor,
                    payload,
                )
                .await?;
            return Ok(Outcome::Enqueued(job_id));
        }

        let words = decode_words(&log.data.0);
        let Some(&block) = words.first() else {
            return Ok(Outcome::Ignored);
        };
        let Some(channel) = self
            .store
            .find_channel_by_offering_agent_client_block(offering_hash, agent, client, block)
            .await?
        else {
            return Ok(Outcome::Skipped);
        };

        let job_type = match kind {
            EventKind::ChannelToppedUp => jobs::AGENT_AFTER_CHANNEL_TOP_UP,
            EventKind::ChannelCloseRequested => jobs::AGENT_AFTER_UNCOOP_CLOSE_REQUEST,
            EventKind::CooperativeClose => jobs::AGENT_AFTER_COOPERATIVE_CLOSE,
            EventKind::UncooperativeClose => jobs::AGENT_AFTER_UNCOOPERATIVE_CLOSE,
            _ => unreachable!(),
        };
        let added_deposit = words.get(1).copied().unwrap_or(0);
        let payload = serde_json::json!({
            "tx_hash": log.tx_hash.to_string(),
            "block": block,
            "added_deposit": added_deposit,
        });
        let job_id = self
            .queue
            .add(
                job_type,
                RelatedType::Channel,
                channel.id.as_uuid(),
                JobCreator::BcMonitor,
                payload,
            )
            .await?;
        Ok(Outcome::Enqueued(job_id))
    }

    /// `offering-created`/`offering-popped-up`: both the agent-side publish-confirmation job and,
    /// separately, the offering-space notification job fan out from the same log.
    async fn translate_offering_event(&self, kind: EventKind, log: &EthLog) -> Result<Outcome, SchedulerError> {
        // `LogOfferingCreated`/`LogOfferingPopedUp`: topic[1] is the agent
        // address, topic[2] is the offering hash.
        let Some(offering_hash) = log.topics.get(2).copied() else {
            return Ok(Outcome::Ignored);
        };
        if self
            .store
            .offering_deletion_logged(log.address, deleted_topic0(), offering_hash)
            .await?
        {
            return Ok(Outcome::Ignored);
        }
        let Some(offering_id) = self.store.find_offering_id_by_hash(offering_hash).await? else {
            return Ok(Outcome::Skipped);
        };

        let payload = serde_json::json!({ "offering_hash": offering_hash.to_string() });

        // `offering-created` additionally confirms the agent's own
        // publish; `offering-popped-up` is a re-advertisement the agent
        // already knows succeeded, so only the client-space notification
        // applies.
        if matches!(kind, EventKind::OfferingCreated) {
            if let Err(e) = self
                .queue
                .add(
                    jobs::AGENT_AFTER_OFFERING_MSG_BC_PUBLISH,
                    RelatedType::Offering,
                    offering_id,
                    JobCreator::BcMonitor,
                    payload.clone(),
                )
                .await
            {
                if !matches!(e, svcchan_queue::QueueError::Duplicate { .. }) {
                    return Err(e.into());
                }
            }
        }

        let job_id = self
            .queue
            .add(
                jobs::CLIENT_AFTER_OFFERING_MSG_BC_PUBLISH,
                RelatedType::Offering,
                offering_id,
                JobCreator::BcMonitor,
                payload,
            )
            .await?;
        Ok(Outcome::Enqueued(job_id))
    }

    /// `offering-deleted`: no job of its own, it only retroactively suppresses a matching
    /// created/popped-up log.
    async fn translate_offering_deleted(&self, _log: &EthLog) -> Result<Outcome, SchedulerError> {
        Ok(Outcome::Ignored)
    }
}

enum Outcome {
    Enqueued(uuid::Uuid),
    Ignored,
    /// Recognized but not yet resolvable (e.g. the channel/offering row has
    /// not been created yet); retried on a later tick via `failures`.
    Skipped,
}

fn address_from_topic(topic: &Hash32) -> EthAddress {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&topic.0[12..32]);
    EthAddress(bytes)
}

/// Splits ABI-encoded non-indexed log data into 32-byte words and reads each
/// as a big-endian integer truncated to `u64` (every numeric field this
/// system cares about — deposits, balances, block numbers — fits in 64
/// bits in practice).
fn decode_words(data: &[u8]) -> Vec<u64> {
    data.chunks_exact(32)
        .map(|word| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&word[24..32]);
            u64::from_be_bytes(buf)
        })
        .collect()
}

fn deleted_topic0() -> Hash32 {
    svcchan_types::events::event_digest("LogOfferingDeleted(address,bytes32)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_words_reads_trailing_bytes_of_each_chunk() {
        let mut data = vec![0u8; 32];
        data[31] = 42;
        data.extend(vec![0u8; 32]);
        data[63] = 7;
        assert_eq!(decode_words(&data), vec![42, 7]);
    }

    #[test]
    fn address_from_topic_strips_left_padding() {
        let mut topic = [0u8; 32];
        topic[12..32].copy_from_slice(&[9u8; 20]);
        let addr = address_from_topic(&Hash32(topic));
        assert_eq!(addr.0, [9u8; 20]);
    }
}
