//! Channel lifecycle handlers: creation, top-up, and both the cooperative and uncooperative close
//! paths.

use tracing::debug;

use svcchan_types::ids::ChannelId;
use svcchan_types::jobs;
use svcchan_types::model::{ChannelStatus, Job, JobCreator, RelatedType, ServiceStatus};

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::wire::{payload_address, payload_hash32, payload_u64};

fn channel_id(job: &Job) -> Result<ChannelId, WorkerError> {
    if job.related_type != RelatedType::Channel {
        return Err(WorkerError::InvalidJob(format!(
            "job {} related_type={:?}, expected Channel",
            job.id, job.related_type
        )));
    }
    Ok(ChannelId(job.related_id))
}

/// Records a just-observed `ChannelCreated` event: recovers the client's public key from the
/// opening transaction, resolves the offering, inserts the channel row, and queues the endpoint-
/// credential flow.
pub async fn agent_after_channel_create(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    let agent = payload_address(&job.payload, "agent")?;
    let client = payload_address(&job.payload, "client")?;
    let offering_hash = payload_hash32(&job.payload, "offering_hash")?;
    let deposit = payload_u64(&job.payload, "deposit")?;
    let block = payload_u64(&job.payload, "block")?;
    let tx_hash = payload_hash32(&job.payload, "tx_hash")?;

    let public_key = ctx.eth.recover_tx_sender_public_key(tx_hash).await?;
    ctx.store.find_or_create_user(client, Some(public_key)).await?;

    let offering_id = ctx
        .store
        .find_offering_id_by_hash(offering_hash)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("no offering for hash {offering_hash}")))?;

    ctx.store
        .insert_channel(svcchan_store::lifecycle::NewChannel {
            id: id.as_uuid(),
            agent,
            client,
            offering: offering_id,
            block,
            total_deposit: deposit,
        })
        .await?;

    ctx.enqueue(
        jobs::AGENT_PRE_ENDPOINT_MSG_CREATE,
        RelatedType::Channel,
        id.as_uuid(),
        JobCreator::Task,
        serde_json::json!({}),
    )
    .await?;
    Ok(())
}

/// Adds an observed `ChannelToppedUp` deposit increase.
pub async fn agent_after_channel_top_up(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    let channel = ctx
        .store
        .get_channel(id.as_uuid())
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("channel {id} not found")))?;
    let block = payload_u64(&job.payload, "block")?;
    if channel.block != block {
        return Err(WorkerError::InvalidJob(format!(
            "channel {id} opened at block {}, top-up event reports block {block}",
            channel.block
        )));
    }
    let added_deposit = payload_u64(&job.payload, "added_deposit")? as i64;
    ctx.store.top_up_channel(id.as_uuid(), added_deposit).await?;
    Ok(())
}

/// A `ChannelCloseRequested` event: the channel enters its challenge period. If the agent is still
/// owed a balance it rushes a cooperative close; otherwise it goes straight to termination once the
/// challenge period elapses.
pub async fn agent_after_uncoop_close_request(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    let channel = ctx
        .store
        .get_channel(id.as_uuid())
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("channel {id} not found")))?;
    ctx.store.set_channel_status(id.as_uuid(), ChannelStatus::InChallenge).await?;

    if channel.receipt_balance > 0 {
        ctx.enqueue(
            jobs::AGENT_PRE_COOPERATIVE_CLOSE,
            RelatedType::Channel,
            id.as_uuid(),
            JobCreator::Task,
            serde_json::json!({}),
        )
        .await?;
    } else {
        ctx.store
            .alter_service_status(
                id.as_uuid(),
                JobCreator::Task,
                jobs::AGENT_PRE_SERVICE_TERMINATE.as_str(),
                None,
                &[ServiceStatus::Pending, ServiceStatus::Active, ServiceStatus::Suspended],
                true,
                serde_json::json!({}),
            )
            .await?;
    }
    Ok(())
}

/// Builds and submits the `cooperativeClose` transaction: the agent signs the same closing-balance
/// hash the client already signed into `receipt_signature`, and the contract call carries both
/// signatures.
pub async fn agent_pre_cooperative_close(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    let channel = ctx
        .store
        .get_channel(id.as_uuid())
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("channel {id} not found")))?;
    let offering = ctx
        .store
        .get_offering(channel.offering)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("offering {} not found", channel.offering)))?;
    let client_signature = channel
        .receipt_signature
        .as_ref()
        .ok_or_else(|| WorkerError::InvalidJob(format!("channel {id} has no receipt signature to close against")))?;

    let account_id = ctx
        .store
        .find_account_id_by_address(channel.agent)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("no local account for agent {}", channel.agent)))?;
    let account = ctx
        .store
        .get_account(account_id)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("account {account_id} not found")))?;

    let psc = ctx.eth.psc_contract();
    let hash = svcchan_crypto::proof::cooperative_close_hash(
        channel.client,
        channel.block,
        offering.hash,
        channel.receipt_balance,
        svcchan_types::model::EthAddress(psc.0),
    );
    let private_key = ctx.decrypt_account_key(&account)?;
    let agent_signature = svcchan_crypto::sign::sign_digest(&hash, &private_key)?;

    let data = svcchan_eth::abi::encode_cooperative_close(
        ethers::types::Address::from(channel.client.0),
        channel.block,
        offering.hash,
        channel.receipt_balance as u128,
        &client_signature.0,
        &agent_signature.0,
    );
    ctx.submit_transaction(&account, psc, data, "cooperativeClose", job.id, RelatedType::Channel, id.as_uuid())
        .await?;

    ctx.store
        .alter_service_status(
            id.as_uuid(),
            JobCreator::Task,
            jobs::AGENT_PRE_SERVICE_TERMINATE.as_str(),
            None,
            &[ServiceStatus::Pending, ServiceStatus::Active, ServiceStatus::Suspended],
            true,
            serde_json::json!({}),
        )
        .await?;
    Ok(())
}

/// Confirms the cooperative close transaction landed.
pub async fn agent_after_cooperative_close(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    ctx.store.set_channel_status(id.as_uuid(), ChannelStatus::ClosedCoop).await?;
    Ok(())
}

/// Confirms the challenge period elapsed without a cooperative close.
pub async fn agent_after_uncooperative_close(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    ctx.store.set_channel_status(id.as_uuid(), ChannelStatus::ClosedUncoop).await?;
    Ok(())
}

/// Carries out a previously admitted terminate transition: the job row already passed
/// `alterServiceStatus`'s allowed-from and duplicate checks when it was created; this handler
/// performs the actual status flip.
pub async fn agent_pre_service_terminate(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    ctx.store.set_service_status(id.as_uuid(), ServiceStatus::Terminated).await?;
    Ok(())
}

/// Carries out a previously admitted suspend transition.
pub async fn agent_pre_service_suspend(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    ctx.store.set_service_status(id.as_uuid(), ServiceStatus::Suspended).await?;
    Ok(())
}

/// Carries out a previously admitted unsuspend transition.
pub async fn agent_pre_service_unsuspend(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = channel_id(job)?;
    ctx.store.set_service_status(id.as_uuid(), ServiceStatus::Active).await?;
    Ok(())
}

/// Declared future work: the client side of an uncooperative close observation has no local state
/// to update.
pub async fn client_after_uncoop_close_request(_ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    debug!(job_id = %job.id, "client-side uncoop-close handling is not implemented, skipping");
    Ok(())
}
