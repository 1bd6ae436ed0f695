//! Endpoint-credential handlers: seals a per-channel access message to the client's public key and
//! relays it through the matching server. The message itself is built and sealed by `svcchan-
//! endpoint` (component L); this module is the job-handler glue around it.

use uuid::Uuid;

use svcchan_types::ids::{ChannelId, EndpointId};
use svcchan_types::jobs;
use svcchan_types::model::{Job, JobCreator, RelatedType, ServiceStatus};

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::wire::payload_str;

/// Builds, seals, and records a channel's endpoint message, and generates
/// the per-channel session credentials.
pub async fn agent_pre_endpoint_msg_create(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    if job.related_type != RelatedType::Channel {
        return Err(WorkerError::InvalidJob(format!(
            "job {} related_type={:?}, expected Channel",
            job.id, job.related_type
        )));
    }
    let channel_id = ChannelId(job.related_id);
    let channel = ctx
        .store
        .get_channel(channel_id.as_uuid())
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("channel {channel_id} not found")))?;
    let client = ctx
        .store
        .get_user_by_address(channel.client)
        .await?
        .ok_or_else(|| WorkerError::PreconditionFailed(format!("no user recorded yet for client {}", channel.client)))?;
    let client_public_key = client
        .public_key
        .ok_or_else(|| WorkerError::PreconditionFailed(format!("client {} has no public key on file yet", channel.client)))?;
    let meta = ctx
        .store
        .endpoint_meta_for_offering(channel.offering.as_uuid())
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("no product metadata for offering {}", channel.offering)))?;

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
    let private_key = ctx.decrypt_account_key(&account)?;

    let sealed = svcchan_endpoint::build_sealed_credential(
        channel_id.as_uuid(),
        meta.template_hash,
        channel.agent,
        meta.service_endpoint_address,
        &client_public_key,
        &private_key,
    )?;

    let endpoint_id = ctx
        .store
        .insert_endpoint(channel_id, meta.access_template.into(), sealed.hash, &sealed.raw)
        .await?;

    ctx.store
        .set_channel_credentials(
            channel_id,
            &sealed.credential.username,
            &sealed.credential.password_hash,
            &sealed.credential.salt,
        )
        .await?;

    ctx.enqueue(
        jobs::AGENT_PRE_ENDPOINT_MSG_SOMC_PUBLISH,
        RelatedType::Endpoint,
        endpoint_id.as_uuid(),
        JobCreator::Task,
        serde_json::json!({ "channel": channel_id.to_string() }),
    )
    .await?;
    Ok(())
}

/// Pushes the sealed endpoint message to the matching server.
pub async fn agent_pre_endpoint_msg_somc_publish(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    if job.related_type != RelatedType::Endpoint {
        return Err(WorkerError::InvalidJob(format!(
            "job {} related_type={:?}, expected Endpoint",
            job.id, job.related_type
        )));
    }
    let endpoint_id = EndpointId(job.related_id);
    let endpoint = ctx
        .store
        .get_endpoint(endpoint_id)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("endpoint {endpoint_id} not found")))?;
    let channel_id: Uuid = payload_str(&job.payload, "channel")?
        .parse()
        .map_err(|e| WorkerError::InvalidJob(format!("payload field channel is not a uuid: {e}")))?;

    ctx.somc.publish_endpoint(ChannelId(channel_id), &endpoint.raw).await?;
    ctx.store
        .update_endpoint_status(endpoint_id, svcchan_types::model::EndpointStatus::MsgChannelPublished)
        .await?;

    ctx.enqueue(
        jobs::AFTER_ENDPOINT_MSG_SOMC_PUBLISH,
        RelatedType::Channel,
        channel_id,
        JobCreator::Task,
        serde_json::json!({}),
    )
    .await?;
    Ok(())
}

/// Once the client can see its endpoint message, prepaid/setup-priced
/// offerings start suspended until the first payment clears it.
pub async fn after_endpoint_msg_somc_publish(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    if job.related_type != RelatedType::Channel {
        return Err(WorkerError::InvalidJob(format!(
            "job {} related_type={:?}, expected Channel",
            job.id, job.related_type
        )));
    }
    let channel = ctx
        .store
        .get_channel(job.related_id)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("channel {} not found", job.related_id)))?;
    let offering = ctx
        .store
        .get_offering(channel.offering)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("offering {} not found", channel.offering)))?;

    if offering.billing_type == svcchan_types::model::BillingType::Prepaid || offering.setup_price > 0 {
        ctx.store
            .alter_service_status(
                job.related_id,
                JobCreator::Task,
                jobs::AGENT_PRE_SERVICE_SUSPEND.as_str(),
                Some(jobs::AGENT_PRE_SERVICE_SUSPEND.as_str()),
                &[ServiceStatus::Pending, ServiceStatus::Active],
                false,
                serde_json::json!({}),
            )
            .await?;
    }
    Ok(())
}
