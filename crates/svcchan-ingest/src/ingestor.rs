//! Polling loop that turns chain-head log filters into `EthLog` rows
//! on every tick, re-read the dynamic settings, compute the confirmed and fresh block ranges, run
//! the three filters, and persist what comes back in one transaction.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use svcchan_eth::EthAdapter;
use svcchan_store::Store;
use svcchan_types::model::EthLog;

use crate::error::IngestError;

/// Tuning for the polling loop; `period` is read from
/// [`svcchan_types::config::IngestConfig`] by the caller.
#[derive(Debug, Clone, Copy)]
pub struct IngestorConfig {
    /// How often to re-issue the three filters.
    pub period: Duration,
}

/// Drives the blockchain log ingestor until `cancel` fires.
pub struct Ingestor {
    store: Store,
    eth: Arc<EthAdapter>,
    config: IngestorConfig,
    /// The last block number already scanned. Deliberately in-memory only
    /// a restart re-scans from the node's current head minus `min_confirmations`, which is safe because
    /// insertion is idempotent per `(tx_hash, log_index)` and duplicates are filtered by the scheduler,
    /// not the ingestor.
    last_processed_block: Option<u64>,
}

impl Ingestor {
    /// Builds an ingestor bound to `store` and `eth`.
    pub fn new(store: Store, eth: Arc<EthAdapter>, config: IngestorConfig) -> Self {
        crate::metrics::install();
        Self {
            store,
            eth,
            config,
            last_processed_block: None,
        }
    }

    /// Runs the poll loop until `cancel` is triggered.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("log ingestor stopping");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().instrument(info_span!("ingest_tick")).await {
                        warn!(error = %e, "log ingest tick failed, will retry next period");
                    }
                }
            }
        }
    }

    /// One poll iteration.
    async fn tick(&mut self) -> Result<(), IngestError> {
        let settings = self.store.load_dynamic_settings().await?;

        let head = self.eth.latest_block_number().await?;
        let latest = head.saturating_sub(settings.min_confirmations);
        let first = self.last_processed_block.map(|b| b + 1).unwrap_or(0);
        if first > latest {
            debug!(first, latest, "no new confirmed blocks");
            return Ok(());
        }
        let fresh = latest.saturating_sub(settings.fresh_offerings_horizon);

        let in_use: Vec<Address> = self
            .store
            .in_use_addresses()
            .await?
            .into_iter()
            .map(|a| Address::from(a.0))
            .collect();

        let mut logs = Vec::new();
        if !in_use.is_empty() {
            let agent = svcchan_eth::filters::agent_filter(
                self.eth.ptc_contract(),
                self.eth.psc_contract(),
                &in_use,
                first,
                latest,
            );
            logs.extend(self.eth.get_logs(&agent).await?);

            let client = svcchan_eth::filters::client_filter(
                self.eth.ptc_contract(),
                self.eth.psc_contract(),
                &in_use,
                first,
                latest,
            );
            logs.extend(self.eth.get_logs(&client).await?);
        }

        let offering = svcchan_eth::filters::offering_filter(self.eth.psc_contract(), fresh, latest);
        logs.extend(self.eth.get_logs(&offering).await?);

        let logs = dedup_by_tx_and_topics(logs);
        if !logs.is_empty() {
            info!(count = logs.len(), first, latest, "persisting new contract logs");
            self.store.insert_eth_logs(&logs).await?;
        }

        self.last_processed_block = Some(latest);
        crate::metrics::set_last_processed_block(latest);
        Ok(())
    }
}

/// The agent and client filters overlap on channel events touching two
/// in-use addresses at once; drop exact duplicates before insertion.
fn dedup_by_tx_and_topics(logs: Vec<EthLog>) -> Vec<EthLog> {
    let mut seen = std::collections::HashSet::new();
    logs.into_iter()
        .filter(|l| seen.insert((l.tx_hash, l.topics.clone(), l.block_number)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcchan_types::model::{Blob, EthAddress, Hash32};

    fn sample_log(tx: u8) -> EthLog {
        EthLog {
            id: svcchan_types::ids::EthLogId::new(),
            tx_hash: Hash32([tx; 32]),
            block_number: 10,
            address: EthAddress([1u8; 20]),
            data: Blob(vec![]),
            topics: vec![Hash32([2u8; 32])],
            job: None,
            failures: 0,
            ignore: false,
        }
    }

    #[test]
    fn dedup_drops_exact_repeats_across_filters() {
        let logs = vec![sample_log(1), sample_log(1), sample_log(2)];
        let deduped = dedup_by_tx_and_topics(logs);
        assert_eq!(deduped.len(), 2);
    }
}
