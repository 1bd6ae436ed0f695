//! Client billing monitor: checks payment lag on every channel the local node holds as client, and
//! dispatches a signed cheque where lag is positive. Each channel is evaluated in its own spawned
//! task per tick.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as HttpClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use svcchan_store::billing::ClientBillingChannel;
use svcchan_store::Store;
use svcchan_types::model::EthAddress;

use crate::error::BillingError;

/// Tuning for the client billing monitor loop.
#[derive(Debug, Clone, Copy)]
pub struct ClientBillingConfig {
    pub collect_period: Duration,
    pub request_timeout: Duration,
    pub request_tls: bool,
    /// The service-payment-channel contract address baked into the
    /// balance-proof hash; same contract the agent closes against.
    pub psc_contract: EthAddress,
}

/// Drives the client-side lag check and cheque dispatch until cancelled.
pub struct ClientBillingMonitor {
    store: Store,
    http: HttpClient,
    config: ClientBillingConfig,
    key_passphrase: Arc<String>,
}

impl ClientBillingMonitor {
    pub fn new(store: Store, config: ClientBillingConfig, key_passphrase: Arc<String>) -> Self {
        crate::metrics::install();
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self {
            store,
            http,
            config,
            key_passphrase,
        }
    }

    /// Runs the lag check on a timer until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.collect_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("client billing monitor stopping");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.clone().tick().instrument(info_span!("client_billing_tick")).await {
                        warn!(error = %e, "client billing tick failed, will retry next period");
                    }
                }
            }
        }
    }

    async fn tick(self: Arc<Self>) -> Result<(), BillingError> {
        let channels = self.store.client_billing_channels().await?;
        for channel in channels {
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.evaluate(channel).await {
                    warn!(error = %e, "client billing check failed for channel, will retry next period");
                }
            });
        }
        Ok(())
    }

    /// One channel's worth of: terminate if fully paid, else check lag and dispatch a cheque if the
    /// client owes more than it has proved.
    async fn evaluate(&self, channel: ClientBillingChannel) -> Result<(), BillingError> {
        if channel.receipt_balance == channel.total_deposit {
            match self
                .store
                .alter_service_status(
                    channel.channel_id,
                    svcchan_types::model::JobCreator::BillingChecker,
                    svcchan_types::jobs::AGENT_PRE_SERVICE_TERMINATE.as_str(),
                    Some(svcchan_types::jobs::AGENT_PRE_SERVICE_TERMINATE.as_str()),
                    &[
                        svcchan_types::model::ServiceStatus::Pending,
                        svcchan_types::model::ServiceStatus::Active,
                        svcchan_types::model::ServiceStatus::Suspended,
                    ],
                    false,
                    serde_json::json!({}),
                )
                .await
            {
                Ok(_) => {}
                Err(svcchan_store::StoreError::Duplicate { .. }) | Err(svcchan_store::StoreError::BadState(_)) => {
                    debug!(channel_id = %channel.channel_id, "terminate already in flight or inapplicable, skipping");
                }
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        let consumed = self.store.channel_usage_sum(channel.channel_id, channel.unit_type).await?;
        let lag = consumed as f64 / channel.billing_interval as f64
            - (channel.receipt_balance as f64 - channel.setup_price as f64) / channel.unit_price as f64;
        if lag <= 0.0 {
            return Ok(());
        }

        let amount = ((consumed as f64 / channel.unit_price as f64 + channel.setup_price as f64) as u64)
            .min(channel.total_deposit);
        self.dispatch_cheque(&channel, amount).await
    }

    /// Builds, signs, and POSTs the cheque, then applies the monotonic `receipt_balance` update on a
    /// `200` reply.
    async fn dispatch_cheque(&self, channel: &ClientBillingChannel, amount: u64) -> Result<(), BillingError> {
        let Some(url) = &channel.payment_url else {
            warn!(channel_id = %channel.channel_id, "channel has no payment endpoint configured, skipping cheque");
            return Ok(());
        };
        let account_id = self
            .store
            .find_account_id_by_address(channel.client)
            .await?
            .ok_or(BillingError::NoLocalAccount(channel.channel_id))?;
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(BillingError::NoLocalAccount(channel.channel_id))?;

        let contract = self.config.psc_contract;
        let hash = svcchan_crypto::proof::balance_proof_hash(channel.agent, channel.block, channel.offering_hash, amount, contract);
        let sensitive = svcchan_crypto::key_store::decrypt_key(&account.private_key_encrypted.0, &self.key_passphrase)?;
        let mut private_key = [0u8; 32];
        private_key.copy_from_slice(&sensitive.0);
        let signature = svcchan_crypto::sign::sign_digest(&hash, &private_key)?;

        let scheme = if self.config.request_tls { "https" } else { "http" };
        let endpoint = format!("{scheme}://{}/pay", url.trim_start_matches("http://").trim_start_matches("https://"));
        let body = serde_json::json!({
            "agentAddress": channel.agent.to_string(),
            "openBlockNum": channel.block,
            "offeringHash": channel.offering_hash.to_string(),
            "balance": amount,
            "balanceMsgSig": hex::encode(signature.0),
            "contractAddress": contract.to_string(),
        });

        let started = std::time::Instant::now();
        let response = self.http.post(&endpoint).json(&body).send().await?;
        crate::metrics::observe_dispatch(started.elapsed().as_secs_f64());
        if response.status().is_success() {
            let updated = self
                .store
                .raise_receipt_balance(channel.channel_id, amount as i64, &signature.0)
                .await?;
            info!(channel_id = %channel.channel_id, amount, updated, "cheque accepted");
        } else {
            warn!(channel_id = %channel.channel_id, status = %response.status(), "cheque rejected by agent");
        }
        Ok(())
    }
}
