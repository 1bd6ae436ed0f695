//! Account balance handlers: the two-step token approve/add-balance flow, balance refreshes after
//! chain-confirmed transfers, and the perpetually-rescheduling balance poll.

use bigdecimal::BigDecimal;
use ethers::types::Address;

use svcchan_types::ids::AccountId;
use svcchan_types::model::{Account, Job, RelatedType};

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::wire::payload_u64;

fn account_id(job: &Job) -> Result<AccountId, WorkerError> {
    if job.related_type != RelatedType::Account {
        return Err(WorkerError::InvalidJob(format!(
            "job {} related_type={:?}, expected Account",
            job.id, job.related_type
        )));
    }
    Ok(AccountId(job.related_id))
}

async fn load_account(ctx: &WorkerContext, id: AccountId) -> Result<Account, WorkerError> {
    ctx.store
        .get_account(id)
        .await?
        .ok_or_else(|| WorkerError::InvalidJob(format!("account {id} not found")))
}

fn to_bigdecimal(v: u64) -> BigDecimal {
    v.to_string().parse().expect("u64 always parses as BigDecimal")
}

fn check_gas(account: &Account, ctx: &WorkerContext) -> Result<(), WorkerError> {
    let required_gas = ctx.config.eth.default_gas_limit.saturating_mul(ctx.config.eth.default_gas_price);
    if account.eth_balance < to_bigdecimal(required_gas) {
        return Err(WorkerError::PreconditionFailed(format!(
            "account {} eth_balance insufficient for gas",
            account.id
        )));
    }
    Ok(())
}

/// Submits the ERC-20 `approve` authorizing the service-payment-channel
/// contract to pull `amount` tokens.
pub async fn pre_account_add_balance_approve(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = account_id(job)?;
    let account = load_account(ctx, id).await?;
    let amount = payload_u64(&job.payload, "amount")?;
    if account.ptc_balance < to_bigdecimal(amount) {
        return Err(WorkerError::PreconditionFailed(format!(
            "account {id} ptc_balance insufficient for requested approval of {amount}"
        )));
    }
    check_gas(&account, ctx)?;

    let data = svcchan_eth::abi::encode_approve(ctx.eth.psc_contract(), amount as u128);
    ctx.submit_transaction(&account, ctx.eth.ptc_contract(), data, "approve", job.id, RelatedType::Account, id.as_uuid())
        .await?;
    Ok(())
}

/// Submits `addBalanceErc20`, moving the already-approved tokens into the
/// service-payment-channel contract.
pub async fn pre_account_add_balance(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let id = account_id(job)?;
    let account = load_account(ctx, id).await?;
    let amount = payload_u64(&job.payload, "amount")?;
    if account.ptc_balance < to_bigdecimal(amount) {
        return Err(WorkerError::PreconditionFailed(format!(
            "account {id} ptc_balance insufficient for requested add-balance of {amount}"
        )));
    }
    check_gas(&account, ctx)?;

    let data = svcchan_eth::abi::encode_add_balance(amount as u128);
    ctx.submit_transaction(&account, ctx.eth.psc_contract(), data, "addBalanceErc20", job.id, RelatedType::Account, id.as_uuid())
        .await?;
    Ok(())
}

/// Refreshes an account's native balance after a chain-confirmed transfer.
///
/// Re-reading the service-payment-channel and token balances would need
/// `eth_call`-based `balanceOf` reads this adapter does not implement yet;
/// only the native-coin balance, which the node already exposes directly,
/// is refreshed here. The cached PSC/PTC balances are carried over
/// unchanged until that plumbing exists.
async fn refresh_native_balance(ctx: &WorkerContext, account: &Account) -> Result<(), WorkerError> {
    let wei = ctx.eth.native_balance(Address::from(account.address.0)).await?;
    let eth_balance: BigDecimal = wei.to_string().parse().expect("U256 decimal string always parses");
    ctx.store
        .update_account_balances(account.id, account.psc_balance.clone(), account.ptc_balance.clone(), eth_balance)
        .await?;
    Ok(())
}

/// `after-account-add-balance`: the `TokenTransfer` event confirming the
/// add-balance transaction landed.
pub async fn after_account_add_balance(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let account = load_account(ctx, account_id(job)?).await?;
    refresh_native_balance(ctx, &account).await
}

/// `after-account-return-balance`: mirrors `after-account-add-balance` for
/// the withdrawal direction.
pub async fn after_account_return_balance(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let account = load_account(ctx, account_id(job)?).await?;
    refresh_native_balance(ctx, &account).await
}

/// `account-add-check-balance`: refreshes the account's balance, then
/// deliberately fails every invocation. This job type is configured with
/// `try_limit = 0` and `try_period = 60s` (see `svcchan_types::jobs`), so
/// the queue's retry path never marks it `failed` or exhausts it — it just
/// reschedules `not_before` sixty seconds out, forever. That is the
/// mechanism behind this job's "periodic balance poll" role: it is a single
/// job that perpetually re-arms itself rather than a cron-style loop.
pub async fn account_add_check_balance(ctx: &WorkerContext, job: &Job) -> Result<(), WorkerError> {
    let account = load_account(ctx, account_id(job)?).await?;
    refresh_native_balance(ctx, &account).await?;
    Err(WorkerError::Rescheduled(format!("account {} balance check armed for next period", account.id)))
}
