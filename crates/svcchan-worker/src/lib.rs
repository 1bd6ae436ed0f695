#![forbid(unsafe_code)]

//! Job handlers for the svcchan control plane: offering publication, channel lifecycle, endpoint-
//! credential sealing, and account balances. Wires all 22 declared job types into one
//! [`svcchan_queue::HandlerRegistry`].

pub mod account;
pub mod channel;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod offering;
mod wire;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use svcchan_queue::{HandlerRegistry, JobHandler};
use svcchan_types::jobs::JobType;
use svcchan_types::model::Job;

pub use context::WorkerContext;
pub use error::WorkerError;

/// Adapts a free `async fn(&WorkerContext, &Job) -> Result<(), WorkerError>`
/// into a [`JobHandler`], converting the error to the string the queue
/// expects.
struct FnHandler<F> {
    ctx: Arc<WorkerContext>,
    f: F,
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Arc<WorkerContext>, Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WorkerError>> + Send,
{
    async fn handle(&self, job: &Job) -> Result<(), String> {
        (self.f)(self.ctx.clone(), job.clone()).await.map_err(|e| e.to_string())
    }
}

fn register<F, Fut>(registry: &mut HandlerRegistry, ctx: &Arc<WorkerContext>, job_type: JobType, f: F)
where
    F: Fn(Arc<WorkerContext>, Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    registry.register(job_type, Arc::new(FnHandler { ctx: ctx.clone(), f }));
}

/// Builds the full handler registry the daemon hands to [`svcchan_queue::Queue`].
pub fn build_registry(ctx: Arc<WorkerContext>) -> HandlerRegistry {
    use svcchan_types::jobs::*;

    let mut registry = HandlerRegistry::new();

    register(&mut registry, &ctx, AGENT_PRE_SERVICE_OFFERING_MSG_BC_PUBLISH, |c, j| async move {
        offering::agent_pre_service_offering_msg_bc_publish(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_AFTER_OFFERING_MSG_BC_PUBLISH, |c, j| async move {
        offering::agent_after_offering_msg_bc_publish(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_PRE_OFFERING_MSG_SOMC_PUBLISH, |c, j| async move {
        offering::agent_pre_offering_msg_somc_publish(&c, &j).await
    });
    register(&mut registry, &ctx, CLIENT_AFTER_OFFERING_MSG_BC_PUBLISH, |c, j| async move {
        offering::client_after_offering_msg_bc_publish(&c, &j).await
    });

    register(&mut registry, &ctx, AGENT_AFTER_CHANNEL_CREATE, |c, j| async move {
        channel::agent_after_channel_create(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_AFTER_CHANNEL_TOP_UP, |c, j| async move {
        channel::agent_after_channel_top_up(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_AFTER_UNCOOP_CLOSE_REQUEST, |c, j| async move {
        channel::agent_after_uncoop_close_request(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_PRE_COOPERATIVE_CLOSE, |c, j| async move {
        channel::agent_pre_cooperative_close(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_AFTER_COOPERATIVE_CLOSE, |c, j| async move {
        channel::agent_after_cooperative_close(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_AFTER_UNCOOPERATIVE_CLOSE, |c, j| async move {
        channel::agent_after_uncooperative_close(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_PRE_SERVICE_TERMINATE, |c, j| async move {
        channel::agent_pre_service_terminate(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_PRE_SERVICE_SUSPEND, |c, j| async move {
        channel::agent_pre_service_suspend(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_PRE_SERVICE_UNSUSPEND, |c, j| async move {
        channel::agent_pre_service_unsuspend(&c, &j).await
    });
    register(&mut registry, &ctx, CLIENT_AFTER_UNCOOP_CLOSE_REQUEST, |c, j| async move {
        channel::client_after_uncoop_close_request(&c, &j).await
    });

    register(&mut registry, &ctx, AGENT_PRE_ENDPOINT_MSG_CREATE, |c, j| async move {
        endpoint::agent_pre_endpoint_msg_create(&c, &j).await
    });
    register(&mut registry, &ctx, AGENT_PRE_ENDPOINT_MSG_SOMC_PUBLISH, |c, j| async move {
        endpoint::agent_pre_endpoint_msg_somc_publish(&c, &j).await
    });
    register(&mut registry, &ctx, AFTER_ENDPOINT_MSG_SOMC_PUBLISH, |c, j| async move {
        endpoint::after_endpoint_msg_somc_publish(&c, &j).await
    });

    register(&mut registry, &ctx, PRE_ACCOUNT_ADD_BALANCE_APPROVE, |c, j| async move {
        account::pre_account_add_balance_approve(&c, &j).await
    });
    register(&mut registry, &ctx, AFTER_ACCOUNT_ADD_BALANCE, |c, j| async move {
        account::after_account_add_balance(&c, &j).await
    });
    register(&mut registry, &ctx, PRE_ACCOUNT_ADD_BALANCE, |c, j| async move {
        account::pre_account_add_balance(&c, &j).await
    });
    register(&mut registry, &ctx, AFTER_ACCOUNT_RETURN_BALANCE, |c, j| async move {
        account::after_account_return_balance(&c, &j).await
    });
    register(&mut registry, &ctx, ACCOUNT_ADD_CHECK_BALANCE, |c, j| async move {
        account::account_add_check_balance(&c, &j).await
    });

    registry
}
