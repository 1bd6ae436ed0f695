//! Offering publication handlers: sign and broadcast an agent's service offering, then relay it to
//! the matching server once the chain confirms it.

use bigdecimal::BigDecimal;
use tracing::debug;

use svcchan_types::ids::OfferingId;
use svcchan_types::jobs;
use svcchan_types::model::{Blob, Job, JobCreator, RelatedType};

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::message::pack_offering_message;

fn offering_id(job: &Job) -> Result<OfferingId, WorkerError> {
    if job.related_type != RelatedType::Offering {
        return Err(WorkerError::InvalidJob(format!(
            "job {} related_type={:?}, expected Offering",
            job.id, job.related_type
        )));
    }
    Ok(OfferingId(job.related_id))
}

/// Signs and hashes the offering message, checks the agent account can
/// afford `registerServiceOffering`'s deposit and its own gas, and submits
/// the transaction.
pub async fn agent_pre_service_offering_msg_bc_publish(
    ctx: &WorkerContext,
    job: &Job,
) -> Result<(), WorkerError> {
    let id = offering_id(job)?;
    let offering = ctx
        .store
        .get_offering(id)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("offering {id} not found")))?;

    let account_id = ctx
        .store
        .find_account_id_by_address(offering.agent)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("no local account for agent {}", offering.agent)))?;
    let account = ctx
        .store
        .get_account(account_id)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("account {account_id} not found")))?;

    let min_deposit = offering
        .min_units
        .saturating_mul(offering.unit_price)
        .saturating_add(offering.setup_price);
    let required_psc = min_deposit.saturating_mul(offering.supply as u64);
    let required_gas = ctx.config.eth.default_gas_limit.saturating_mul(ctx.config.eth.default_gas_price);

    if account.psc_balance < to_bigdecimal(required_psc) {
        return Err(WorkerError::PreconditionFailed(format!(
            "account {account_id} psc_balance insufficient for {} offerings at min_deposit {min_deposit}",
            offering.supply
        )));
    }
    if account.eth_balance < to_bigdecimal(required_gas) {
        return Err(WorkerError::PreconditionFailed(format!(
            "account {account_id} eth_balance insufficient for gas"
        )));
    }

    let private_key = ctx.decrypt_account_key(&account)?;
    let packed = pack_offering_message(&offering);
    let hash = svcchan_crypto::hash::keccak256(&packed);
    let signature = svcchan_crypto::sign::sign_digest(&hash, &private_key)?;
    let mut raw = packed;
    raw.extend_from_slice(&signature.0);

    ctx.store.set_offering_published(id, hash, &Blob(raw)).await?;

    let data = svcchan_eth::abi::encode_register_service_offering(hash, min_deposit as u128, offering.supply);
    ctx.submit_transaction(
        &account,
        ctx.eth.psc_contract(),
        data,
        "registerServiceOffering",
        job.id,
        RelatedType::Offering,
        id.as_uuid(),
    )
    .await?;
    Ok(())
}

fn to_bigdecimal(v: u64) -> BigDecimal {
    v.to_string().parse().expect("u64 always parses as BigDecimal")
}

/// The `OfferingCreated` log confirmed the transaction above landed: advance `msg_status` and queue
/// the matching-server publish.
pub async fn agent_after_offering_msg_bc_publish(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = offering_id(job)?;
    ctx.store
        .update_offering_msg_status(id, svcchan_types::model::OfferingMsgStatus::BchainPublished)
        .await?;
    ctx.enqueue(
        jobs::AGENT_PRE_OFFERING_MSG_SOMC_PUBLISH,
        RelatedType::Offering,
        id.as_uuid(),
        JobCreator::Task,
        serde_json::json!({}),
    )
    .await?;
    Ok(())
}

/// Pushes the signed offering message to the matching server.
pub async fn agent_pre_offering_msg_somc_publish(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = offering_id(job)?;
    let offering = ctx
        .store
        .get_offering(id)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("offering {id} not found")))?;
    ctx.somc.publish_offering(&offering.hash, &offering.raw).await?;
    ctx.store
        .update_offering_msg_status(id, svcchan_types::model::OfferingMsgStatus::MsgChannelPublished)
        .await?;
    Ok(())
}

/// Declared future work: turning this job into a locally cached offering row is out of scope. Logs
/// and returns success.
pub async fn client_after_offering_msg_bc_publish(_ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    debug!(job_id = %job.id, "client-side offering ingestion is not implemented, skipping");
    Ok(())
}
