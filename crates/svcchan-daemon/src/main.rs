//! Process entry point: loads configuration, wires every component, and
//! runs until `SIGINT`/`SIGTERM` (config file + env overrides, tracing init
//! first, `tokio::select!` on ctrl-c for shutdown).

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use svcchan_billing::{AgentBillingConfig, AgentBillingMonitor, ClientBillingConfig, ClientBillingMonitor};
use svcchan_eth::EthAdapter;
use svcchan_ingest::{Ingestor, IngestorConfig};
use svcchan_queue::{Queue, QueueConfig};
use svcchan_scheduler::{Scheduler, SchedulerConfig};
use svcchan_somc::SomcClient;
use svcchan_store::Store;
use svcchan_types::model::EthAddress;
use svcchan_worker::WorkerContext;

#[derive(Parser, Debug)]
#[clap(name = "svcchand", version, about = "Control-plane daemon for the svcchan marketplace")]
struct Opts {
    /// Path to the TOML configuration file.
    #[clap(long, env = "SVCCHAN_CONFIG")]
    config: std::path::PathBuf,
}

fn init_tracing(format: svcchan_types::config::LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        svcchan_types::config::LogFormat::Json => {
            let subscriber = Registry::default().with(filter).with(fmt::layer().json().with_target(true));
            tracing::subscriber::set_global_default(subscriber).context("installing json tracing subscriber")?;
        }
        svcchan_types::config::LogFormat::Pretty => {
            let subscriber = Registry::default().with(filter).with(fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber).context("installing pretty tracing subscriber")?;
        }
    }
    Ok(())
}

/// Parses a `"0x"`-prefixed hex address from the config file into this
/// crate's fixed-size type. `ethers::types::Address`'s own `FromStr` handles
/// the parallel parse for the chain adapter below; the two are independent
/// because `svcchan-eth` and `svcchan-types` deliberately don't share an
/// address type.
fn parse_eth_address(field: &str, value: &str) -> Result<EthAddress> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped).with_context(|| format!("{field} is not valid hex"))?;
    EthAddress::from_slice(&bytes).map_err(|e| anyhow::anyhow!("{field}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    let config = config::load(&opts.config)?;
    init_tracing(config.log_format)?;

    tracing::info!(config = %opts.config.display(), "starting svcchan daemon");

    let store = Store::connect(&config.db.url, config.db.max_connections).await.context("connecting to database")?;

    let psc_contract: ethers::types::Address =
        config.eth.psc_contract.parse().context("eth.psc_contract is not a valid address")?;
    let ptc_contract: ethers::types::Address =
        config.eth.ptc_contract.parse().context("eth.ptc_contract is not a valid address")?;
    let eth = Arc::new(
        EthAdapter::connect(&config.eth.rpc_url, config.eth.chain_id, psc_contract, ptc_contract)
            .await
            .context("connecting to ethereum node")?,
    );

    let somc_url = url::Url::parse(&config.somc.url).context("somc.url is not a valid url")?;
    let somc = Arc::new(SomcClient::spawn(somc_url, Duration::from_millis(config.somc.reconn_period_ms)));

    let config = Arc::new(config);

    let worker_ctx = Arc::new(WorkerContext::new(store.clone(), eth.clone(), somc.clone(), config.clone()));
    let registry = svcchan_worker::build_registry(worker_ctx);

    let queue_config = QueueConfig {
        workers: config.queue.workers.unwrap_or_else(|| num_cpus::get().max(1)),
        collect_period: Duration::from_millis(config.queue.collect_period_ms),
        collect_jobs: config.queue.collect_jobs as i64,
        worker_channel_capacity: config.queue.worker_channel_capacity,
    };
    let queue = Arc::new(Queue::new(store.clone(), registry, queue_config));
    let process_handle = queue.process().context("starting job queue")?;

    let cancel = CancellationToken::new();

    let ingestor = Ingestor::new(
        store.clone(),
        eth.clone(),
        IngestorConfig {
            period: Duration::from_millis(config.ingest.period_ms),
        },
    );
    let ingestor_task = tokio::spawn(ingestor.run(cancel.child_token()));

    let scheduler = Scheduler::new(
        store.clone(),
        queue.clone(),
        SchedulerConfig {
            period: Duration::from_millis(config.scheduler.period_ms),
            ..SchedulerConfig::default()
        },
    );
    let scheduler_task = tokio::spawn(scheduler.run(cancel.child_token()));

    let agent_billing = AgentBillingMonitor::new(
        store.clone(),
        AgentBillingConfig {
            period: Duration::from_millis(config.agent_billing.period_ms),
        },
    );
    let agent_billing_task = tokio::spawn(agent_billing.run(cancel.child_token()));

    let psc_address = parse_eth_address("eth.psc_contract", &config.eth.psc_contract)?;
    let client_billing = Arc::new(ClientBillingMonitor::new(
        store.clone(),
        ClientBillingConfig {
            collect_period: Duration::from_millis(config.client_billing.collect_period_ms),
            request_timeout: Duration::from_millis(config.client_billing.request_timeout_ms),
            request_tls: config.client_billing.request_tls,
            psc_contract: psc_address,
        },
        Arc::new(config.key_passphrase.clone()),
    ));
    let client_billing_task = tokio::spawn(client_billing.run(cancel.child_token()));

    const PAYMENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    let payment_router = svcchan_payment::build(store.clone(), PAYMENT_REQUEST_TIMEOUT);
    let payment_bind_address = config.payment_server.bind_address.clone();
    let payment_task = tokio::spawn(async move {
        if let Err(e) = svcchan_payment::serve(payment_router, &payment_bind_address).await {
            tracing::error!(error = %e, "payment receiver HTTP server stopped");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    cancel.cancel();
    let _ = ingestor_task.await;
    let _ = scheduler_task.await;
    let _ = agent_billing_task.await;
    let _ = client_billing_task.await;
    payment_task.abort();

    if let Err(e) = process_handle.close().await {
        tracing::error!(error = %e, "job queue reported an error on shutdown");
    }

    tracing::info!("svcchan daemon stopped");
    Ok(())
}
