//! Agent billing monitor: five checks run every period in a fixed order, plus a sixth check
//! (suspend lagging payers) kept separate and invoked on its own cadence rather than every tick.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use svcchan_store::Store;
use svcchan_types::jobs;
use svcchan_types::model::{JobCreator, ServiceStatus, UnitType};

use crate::error::BillingError;

const TERMINATE_FROM: &[ServiceStatus] = &[ServiceStatus::Pending, ServiceStatus::Active, ServiceStatus::Suspended];
const SUSPEND_FROM: &[ServiceStatus] = &[ServiceStatus::Pending, ServiceStatus::Active];
const UNSUSPEND_FROM: &[ServiceStatus] = &[ServiceStatus::Suspended];

/// Tuning for the agent billing monitor loop.
#[derive(Debug, Clone, Copy)]
pub struct AgentBillingConfig {
    pub period: Duration,
}

/// Drives the agent-side billing checks until cancelled.
pub struct AgentBillingMonitor {
    store: Store,
    config: AgentBillingConfig,
}

impl AgentBillingMonitor {
    pub fn new(store: Store, config: AgentBillingConfig) -> Self {
        Self { store, config }
    }

    /// Runs checks 1-5 on a timer until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("agent billing monitor stopping");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().instrument(info_span!("agent_billing_tick")).await {
                        warn!(error = %e, "agent billing tick failed, will retry next period");
                    }
                }
            }
        }
    }

    /// One round: checks 1-5 of, in order.
    async fn tick(&self) -> Result<(), BillingError> {
        self.terminate_over_cap(UnitType::Seconds).await?;
        self.terminate_over_cap(UnitType::Units).await?;
        self.terminate_inactive().await?;
        self.unsuspend_payers().await?;
        self.terminate_over_suspended().await?;
        Ok(())
    }

    /// Checks 1/2: terminate channels that reached their deposit ceiling or
    /// the offering's hard unit cap.
    async fn terminate_over_cap(&self, unit_type: UnitType) -> Result<(), BillingError> {
        let ids = self.store.channels_over_cap(unit_type).await?;
        for id in ids {
            self.terminate(id, "over deposit/unit cap").await?;
        }
        Ok(())
    }

    /// Check 3: terminate channels idle past the offering's inactivity window.
    async fn terminate_inactive(&self) -> Result<(), BillingError> {
        let ids = self.store.channels_inactive().await?;
        for id in ids {
            self.terminate(id, "inactive past max_inactive_time_sec").await?;
        }
        Ok(())
    }

    /// Check 4: unsuspend channels whose payer caught back up.
    async fn unsuspend_payers(&self) -> Result<(), BillingError> {
        let ids = self.store.channels_to_unsuspend().await?;
        for id in ids {
            self.alter(
                id,
                jobs::AGENT_PRE_SERVICE_UNSUSPEND,
                UNSUSPEND_FROM,
                "lag caught up, unsuspending",
            )
            .await?;
        }
        Ok(())
    }

    /// Check 5: terminate channels that have been suspended longer than the
    /// offering's `max_suspend_time` tolerates.
    async fn terminate_over_suspended(&self) -> Result<(), BillingError> {
        let ids = self.store.channels_over_suspended().await?;
        for id in ids {
            self.terminate(id, "suspended past max_suspend_time").await?;
        }
        Ok(())
    }

    /// Check 6: suspend channels whose payer has fallen behind. Not run by [`Self::run`]'s loop;
    /// callers (the daemon, or an admin action) invoke it on whatever cadence fits.
    pub async fn suspend_lagging_payers(&self) -> Result<(), BillingError> {
        let ids = self.store.channels_to_suspend().await?;
        for id in ids {
            self.alter(id, jobs::AGENT_PRE_SERVICE_SUSPEND, SUSPEND_FROM, "lag exceeded tolerance, suspending")
                .await?;
        }
        Ok(())
    }

    async fn terminate(&self, id: uuid::Uuid, reason: &str) -> Result<(), BillingError> {
        self.alter(id, jobs::AGENT_PRE_SERVICE_TERMINATE, TERMINATE_FROM, reason).await
    }

    async fn alter(
        &self,
        channel_id: uuid::Uuid,
        job_type: svcchan_types::jobs::JobType,
        allowed_from: &[ServiceStatus],
        reason: &str,
    ) -> Result<(), BillingError> {
        match self
            .store
            .alter_service_status(
                channel_id,
                JobCreator::BillingChecker,
                job_type.as_str(),
                Some(job_type.as_str()),
                allowed_from,
                false,
                serde_json::json!({}),
            )
            .await
        {
            Ok(_) => {
                info!(channel_id = %channel_id, job_type = job_type.as_str(), reason, "billing check dispatched job");
                Ok(())
            }
            Err(svcchan_store::StoreError::Duplicate { .. })
            | Err(svcchan_store::StoreError::BadState(_))
            | Err(svcchan_store::StoreError::Busy) => {
                debug!(channel_id = %channel_id, job_type = job_type.as_str(), "billing check already in flight or inapplicable, skipping");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
