//! Static daemon configuration, loaded once from a TOML file at startup
//! . Values that change at runtime without a redeploy live in the `setting` table instead; see
//! [`DynamicSettings`].

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// A `postgres://` connection URL. May be overridden by the
    /// `SVCCHAN_DB_URL` environment variable.
    pub url: String,
    /// Maximum size of the connection pool.
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

fn default_pool_size() -> u32 {
    10
}

/// Ethereum JSON-RPC connection and contract configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthConfig {
    /// WebSocket or HTTP JSON-RPC endpoint of the Ethereum node.
    pub rpc_url: String,
    /// Chain id, used to guard against submitting to the wrong network.
    pub chain_id: u64,
    /// Address of the service-payment-channel contract (PSC).
    pub psc_contract: String,
    /// Address of the ERC20-style token contract (PTC).
    pub ptc_contract: String,
    /// Gas price (wei) used for transactions unless overridden per job.
    pub default_gas_price: u64,
    /// Gas limit used for transactions unless overridden per job.
    pub default_gas_limit: u64,
}

/// Tuning for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of worker tasks. Defaults to the number of logical CPUs.
    pub workers: Option<usize>,
    /// How often the collector polls for newly eligible jobs.
    #[serde(default = "default_collect_period_ms")]
    pub collect_period_ms: u64,
    /// Maximum rows fetched per collector poll.
    #[serde(default = "default_collect_jobs")]
    pub collect_jobs: u32,
    /// Per-worker input channel capacity.
    #[serde(default = "default_worker_channel_capacity")]
    pub worker_channel_capacity: usize,
}

fn default_collect_period_ms() -> u64 {
    1_000
}
fn default_collect_jobs() -> u32 {
    100
}
fn default_worker_channel_capacity() -> usize {
    64
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: None,
            collect_period_ms: default_collect_period_ms(),
            collect_jobs: default_collect_jobs(),
            worker_channel_capacity: default_worker_channel_capacity(),
        }
    }
}

/// Tuning for the blockchain log ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// How often the ingestor polls for new confirmed blocks.
    #[serde(default = "default_ingest_period_ms")]
    pub period_ms: u64,
}

fn default_ingest_period_ms() -> u64 {
    5_000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            period_ms: default_ingest_period_ms(),
        }
    }
}

/// Tuning for the event scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the scheduler polls for untranslated `EthLog` rows.
    #[serde(default = "default_scheduler_period_ms")]
    pub period_ms: u64,
}

fn default_scheduler_period_ms() -> u64 {
    3_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_ms: default_scheduler_period_ms(),
        }
    }
}

/// Tuning for the agent billing monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBillingConfig {
    /// How often the agent billing monitor runs its five checks.
    #[serde(default = "default_agent_billing_period_ms")]
    pub period_ms: u64,
}

fn default_agent_billing_period_ms() -> u64 {
    30_000
}

impl Default for AgentBillingConfig {
    fn default() -> Self {
        Self {
            period_ms: default_agent_billing_period_ms(),
        }
    }
}

/// Tuning for the client billing monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBillingConfig {
    /// How often the client billing monitor evaluates payment lag.
    pub collect_period_ms: u64,
    /// Timeout for the cheque POST request; must be less than
    /// `collect_period_ms`.
    pub request_timeout_ms: u64,
    /// Whether cheques are posted over `https://` (`true`) or `http://`.
    #[serde(default = "default_true")]
    pub request_tls: bool,
}

impl Default for ClientBillingConfig {
    fn default() -> Self {
        Self {
            collect_period_ms: 10_000,
            request_timeout_ms: 5_000,
            request_tls: true,
        }
    }
}

/// Configuration for the payment-receiver HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentServerConfig {
    /// Address to bind the HTTP listener to, e.g. `"0.0.0.0:8080"`.
    pub bind_address: String,
}

/// Configuration for the matching-server client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomcConfig {
    /// WebSocket URL of the matching server.
    pub url: String,
    /// Delay before attempting to reconnect after a transport error.
    #[serde(default = "default_reconn_period_ms")]
    pub reconn_period_ms: u64,
}

fn default_reconn_period_ms() -> u64 {
    5_000
}

/// Logging output format selected via [`Config::log_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// Structured JSON, for production log aggregation.
    Json,
}

/// Top-level daemon configuration, deserialized from the TOML file named on
/// the command line. Secrets may be overridden by `SVCCHAN_`-prefixed environment variables at load
/// time; see `svcchan-daemon`'s config loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection settings.
    pub db: DbConfig,
    /// Ethereum node and contract settings.
    pub eth: EthConfig,
    /// Job queue tuning.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Log ingestor tuning.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Event scheduler tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Agent billing monitor tuning.
    #[serde(default)]
    pub agent_billing: AgentBillingConfig,
    /// Client billing monitor tuning.
    #[serde(default)]
    pub client_billing: ClientBillingConfig,
    /// Payment-receiver HTTP surface.
    pub payment_server: PaymentServerConfig,
    /// Matching-server client settings.
    pub somc: SomcConfig,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Passphrase protecting every account's `private_key_encrypted` blob
    /// . Held in memory only; never logged. Must be supplied via the `SVCCHAN_KEY_PASSPHRASE`
    /// environment variable rather than written to the TOML file.
    #[serde(default)]
    pub key_passphrase: String,
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Dynamic, hot-reloadable tuning cells stored in the `setting` table, rather than the static TOML
/// file.
#[derive(Debug, Clone, Copy)]
pub struct DynamicSettings {
    /// Minimum confirmations before a block is considered final.
    pub min_confirmations: u64,
    /// Maximum look-back depth, in blocks, for offering-related logs.
    /// `0` means no horizon (scan from `first`).
    pub fresh_offerings_horizon: u64,
    /// Maximum scheduler translation attempts per `EthLog` row before it is
    /// excluded from further consideration. `0` means unbounded.
    pub max_event_retry: u64,
}

/// Well-known keys used to store [`DynamicSettings`] fields in the `setting`
/// table.
pub mod setting_keys {
    /// Key for [`super::DynamicSettings::min_confirmations`].
    pub const MIN_CONFIRMATIONS: &str = "eth.min.confirmations";
    /// Key for [`super::DynamicSettings::fresh_offerings_horizon`].
    pub const FRESH_OFFERINGS_HORIZON: &str = "eth.event.freshofferings";
    /// Key for [`super::DynamicSettings::max_event_retry`].
    pub const MAX_EVENT_RETRY: &str = "eth.event.maxretry";
    /// Key for the admin password hash.
    pub const ADMIN_PASSWORD_HASH: &str = "admin.password.hash";
    /// Key for the admin password salt.
    pub const ADMIN_PASSWORD_SALT: &str = "admin.password.salt";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_defaults() {
        let toml_src = r#"
            [db]
            url = "postgres://localhost/svcchan"

            [eth]
            rpc_url = "ws://localhost:8546"
            chain_id = 1
            psc_contract = "0x0000000000000000000000000000000000000001"
            ptc_contract = "0x0000000000000000000000000000000000000002"
            default_gas_price = 1
            default_gas_limit = 21000

            [payment_server]
            bind_address = "0.0.0.0:8080"

            [somc]
            url = "wss://somc.example.invalid/ws"
        "#;
        let cfg: Config = toml::from_str(toml_src).expect("valid config");
        assert_eq!(cfg.queue.collect_jobs, 100);
        assert_eq!(cfg.client_billing.collect_period_ms, 10_000);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }
}
