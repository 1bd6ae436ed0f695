//! Durable entities and the small binary/enum value types they are built from. Binary fields
//! (addresses, hashes, public keys, signatures, raw messages) are modeled as fixed- or variable-
//! length byte newtypes that (de)serialize to/from URL-safe base64 text, the internal wire and
//! storage convention this service uses. Free-form blobs that are genuinely opaque to this crate
//! (job payloads, product configuration) are kept as `serde_json::Value`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{
    AccountId, ChannelId, EndpointId, EthLogId, EthTxId, JobId, OfferingId, ProductId, RelatedType,
    SessionId, TemplateId, UserId,
};

macro_rules! fixed_bytes {
    ($name:ident, $len:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length in bytes of this fixed-size value.
            pub const LEN: usize = $len;

            /// Builds from a byte slice, failing if the length does not match.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, crate::error::CoreError> {
                if bytes.len() != $len {
                    return Err(crate::error::CoreError::Decode(format!(
                        "expected {} bytes, got {}",
                        $len,
                        bytes.len()
                    )));
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Ok(Self(buf))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&URL_SAFE_NO_PAD.encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let text = String::deserialize(deserializer)?;
                let bytes = URL_SAFE_NO_PAD
                    .decode(text.as_bytes())
                    .map_err(serde::de::Error::custom)?;
                Self::from_slice(&bytes).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(EthAddress, 20, "A 20-byte Ethereum-style account address.");
fixed_bytes!(Hash32, 32, "A 32-byte Keccak-256 digest.");
fixed_bytes!(PublicKey65, 65, "An uncompressed secp256k1 public key.");

/// A variable-length signature, ciphertext, or other opaque binary blob,
/// stored and transmitted as URL-safe base64 text.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Blob(pub Vec<u8>);

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl Serialize for Blob {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

/// A password credential stored as a salted hash, never the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHash {
    /// The hashed password material.
    pub hash: Blob,
    /// The salt used to derive `hash`.
    pub salt: Blob,
}

/// A local blockchain identity the node controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Primary key.
    pub id: AccountId,
    /// The account's on-chain address.
    pub address: EthAddress,
    /// The account's uncompressed public key.
    pub public_key: PublicKey65,
    /// The private key, encrypted at rest (see `svcchan-crypto::key_store`).
    pub private_key_encrypted: Blob,
    /// Whether this is the operator's default signing account.
    pub is_default: bool,
    /// Operational toggle: only `in_use` accounts are watched by the log
    /// ingestor and billing monitors.
    pub in_use: bool,
    /// Human-readable label shown to the operator.
    pub name: String,
    /// Cached service-contract balance, in contract units.
    pub psc_balance: BigDecimal,
    /// Cached token-contract balance.
    pub ptc_balance: BigDecimal,
    /// Cached native-coin balance (wei, as an arbitrary-precision integer).
    pub eth_balance: BigDecimal,
    /// When the three balances above were last refreshed from chain.
    pub last_balance_check: Option<DateTime<Utc>>,
}

/// A remote peer identity observed on chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Primary key.
    pub id: UserId,
    /// The counter-party's on-chain address.
    pub address: EthAddress,
    /// The counter-party's public key, if it has been recovered.
    pub public_key: Option<PublicKey65>,
}

/// Which artifact a [`Template`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// An offering message schema.
    Offer,
    /// An endpoint (access) message schema.
    Access,
}

/// A schema for either an offering message or an endpoint message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Primary key.
    pub id: TemplateId,
    /// Which kind of message this template describes.
    pub kind: TemplateKind,
    /// The raw schema/descriptor bytes.
    pub raw: Blob,
    /// Keccak-256 of `raw`.
    pub hash: Hash32,
}

/// How a product's service daemon reports consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageReportDiscipline {
    /// Each report carries the delta since the last report.
    Incremental,
    /// Each report carries the running total.
    Total,
}

/// An agent-side service type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Primary key.
    pub id: ProductId,
    /// Operator-facing name.
    pub name: String,
    /// Whether this product runs a server-side daemon (as opposed to being
    /// purely client-consumed).
    pub is_server: bool,
    /// Reference to the offer-message [`Template`].
    pub offer_template: TemplateId,
    /// Reference to the access-message [`Template`].
    pub access_template: TemplateId,
    /// Usage-reporting discipline used by the session server for this product.
    pub usage_report: UsageReportDiscipline,
    /// Credential the session server uses to authenticate reports for this
    /// product (hashed, never the plaintext).
    pub password: PasswordHash,
    /// Opaque, product-specific configuration blob.
    pub config: serde_json::Value,
    /// Optional concrete service endpoint address (host:port or URI).
    pub service_endpoint_address: Option<String>,
}

/// Where an [`Offering`]'s signed message currently stands relative to the
/// chain and the matching server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferingMsgStatus {
    /// Stored locally, not yet signed or submitted anywhere.
    Unpublished,
    /// The `RegisterServiceOffering` transaction has been submitted.
    BchainPublishing,
    /// The `OfferingCreated` log has been observed.
    BchainPublished,
    /// The signed message has been pushed to the matching server.
    MsgChannelPublished,
}

/// The agent's intent for an [`Offering`]'s on-chain registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    /// No registration action pending.
    Empty,
    /// Registration has been requested.
    Register,
    /// Removal has been requested (never actually executed; and ).
    Remove,
}

/// What a channel's consumption is metered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Metered in wall-clock seconds.
    Seconds,
    /// Metered in abstract usage units.
    Units,
}

/// When the client is expected to pay relative to consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    /// Payment is expected up front.
    Prepaid,
    /// Payment trails consumption, subject to `max_billing_unit_lag`.
    Postpaid,
}

/// A concrete, priced service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    /// Primary key.
    pub id: OfferingId,
    /// The agent's on-chain address.
    pub agent: EthAddress,
    /// Reference to the [`Product`] this offering sells.
    pub product: ProductId,
    /// Reference to the offer-message [`Template`].
    pub template: TemplateId,
    /// Keccak-256 of the canonical signed offering message.
    pub hash: Hash32,
    /// `true` for offerings never exported to the matching server.
    pub is_local: bool,
    /// Progress of the signed message toward the chain and matching server.
    pub msg_status: OfferingMsgStatus,
    /// The agent's current registration intent.
    pub offer_status: OfferStatus,
    /// Remaining channel slots this offering can still accept.
    pub supply: u32,
    /// ISO-3166-1 alpha-2 country code.
    pub country: String,
    /// Whether consumption is metered in seconds or abstract units.
    pub unit_type: UnitType,
    /// Whether payment is expected up front or trails consumption.
    pub billing_type: BillingType,
    /// One-time price charged on channel creation.
    pub setup_price: u64,
    /// Price per unit of consumption.
    pub unit_price: u64,
    /// Minimum units a channel must be funded for.
    pub min_units: u64,
    /// Optional hard cap on units consumable over the channel's lifetime.
    pub max_unit: Option<u64>,
    /// Units expected per billing interval.
    pub billing_interval: u32,
    /// Tolerance, in units, before a lagging payer is suspended.
    pub max_billing_unit_lag: u32,
    /// Maximum time, in seconds, a channel may remain suspended before being
    /// terminated.
    pub max_suspend_time: u32,
    /// Maximum inactivity, in seconds, before a channel is terminated.
    pub max_inactive_time_sec: Option<u64>,
    /// Units granted to the client free of charge.
    pub free_units: u8,
    /// The canonical signed offering message (packed fields + agent
    /// signature), set once `hash` is computed. Empty until the publish handler runs.
    pub raw: Blob,
}

/// On-chain lifecycle of a [`Channel`], driven exclusively by observed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Creation transaction submitted but not yet confirmed on chain.
    Pending,
    /// Open and usable.
    Active,
    /// A cooperative close has been requested.
    WaitCoop,
    /// Cooperatively closed.
    ClosedCoop,
    /// An uncooperative close has been requested; challenge period pending.
    WaitChallenge,
    /// In the on-chain challenge period.
    InChallenge,
    /// Waiting for the uncooperative close to settle.
    WaitUncoop,
    /// Uncooperatively closed.
    ClosedUncoop,
}

/// Service-level lifecycle of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Channel created but the client has no usable access yet.
    Pending,
    /// Client has usable access.
    Active,
    /// Access withheld pending payment or operator action.
    Suspended,
    /// Access permanently revoked.
    Terminated,
}

impl ServiceStatus {
    /// Returns `true` if `self -> to` is a legal transition under
    pub fn can_transition_to(self, to: ServiceStatus) -> bool {
        use ServiceStatus::*;
        matches!(
            (self, to),
            (Pending, Active)
                | (Pending, Suspended)
                | (Pending, Terminated)
                | (Active, Suspended)
                | (Active, Terminated)
                | (Suspended, Active)
                | (Suspended, Terminated)
        )
    }
}

/// A state-channel between one agent and one client for one offering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Primary key. Also used as the matching-server "state channel" key and
    /// as the service daemon's username.
    pub id: ChannelId,
    /// The agent's on-chain address.
    pub agent: EthAddress,
    /// The client's on-chain address.
    pub client: EthAddress,
    /// Reference to the priced [`Offering`].
    pub offering: OfferingId,
    /// Block number at which the channel-creation event was observed.
    pub block: u64,
    /// Total amount deposited into the channel.
    pub total_deposit: u64,
    /// The last proved-paid amount; monotonically non-decreasing.
    pub receipt_balance: u64,
    /// The client's signature over the last accepted balance proof.
    pub receipt_signature: Option<Blob>,
    /// On-chain lifecycle state.
    pub channel_status: ChannelStatus,
    /// Service-level lifecycle state.
    pub service_status: ServiceStatus,
    /// When `service_status` last changed.
    pub service_status_changed_at: DateTime<Utc>,
    /// Username the service daemon uses to authenticate this channel's
    /// traffic (conventionally the channel id itself).
    pub username: String,
    /// Per-channel credential the service daemon uses to authenticate this
    /// channel's traffic.
    pub password: PasswordHash,
}

impl Channel {
    /// `true` if `receipt_balance <= total_deposit`, the core payment
    /// invariant that must hold for every row version ever written.
    pub fn balance_invariant_holds(&self) -> bool {
        self.receipt_balance <= self.total_deposit
    }
}

/// A usage record for a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Primary key.
    pub id: SessionId,
    /// Reference to the [`Channel`] this session measures usage for.
    pub channel: ChannelId,
    /// When the session started.
    pub started: DateTime<Utc>,
    /// When the session ended, if it has.
    pub stopped: Option<DateTime<Utc>>,
    /// Abstract units consumed so far in this session.
    pub units_used: u64,
    /// Wall-clock seconds consumed so far in this session.
    pub seconds_consumed: u64,
    /// Timestamp of the most recent usage report.
    pub last_usage_time: DateTime<Utc>,
    /// Client's observed IP address.
    pub client_ip: String,
    /// Client's observed source port.
    pub client_port: u16,
}

/// Progress of an [`Endpoint`] message toward the matching server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    /// Built and sealed, not yet published anywhere.
    Unpublished,
    /// Reserved for parity with [`OfferingMsgStatus`]; endpoints are not
    /// themselves registered on chain, but the channel that carries them is.
    BchainPublished,
    /// Pushed to the matching server.
    MsgChannelPublished,
}

/// A sealed, signed access-message artifact for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Primary key.
    pub id: EndpointId,
    /// Reference to the [`Channel`] this grants access to.
    pub channel: ChannelId,
    /// Reference to the access-message [`Template`].
    pub template: TemplateId,
    /// Keccak-256 of the sealed message.
    pub hash: Hash32,
    /// The raw sealed (encrypted + signed) message bytes.
    pub raw: Blob,
    /// Publication progress.
    pub status: EndpointStatus,
}

/// Who or what caused a [`Job`] to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCreator {
    /// An operator-facing API call.
    User,
    /// The agent billing monitor.
    BillingChecker,
    /// The blockchain log ingestor/scheduler.
    BcMonitor,
    /// Another job's handler, enqueuing follow-up work.
    Task,
}

/// A unit of deferred work; see [`crate::jobs`] for the closed set of job type tags and
/// [`JobStatus`] for the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Primary key.
    pub id: JobId,
    /// The job's type tag; see [`crate::jobs::JobType`].
    pub job_type: String,
    /// Lifecycle state.
    pub status: crate::jobs::JobStatus,
    /// What kind of entity `related_id` refers to.
    pub related_type: RelatedType,
    /// The entity this job mutates; also the per-entity affinity key.
    pub related_id: uuid::Uuid,
    /// When this job was created.
    pub created_at: DateTime<Utc>,
    /// Earliest time this job may be picked up by the collector.
    pub not_before: DateTime<Utc>,
    /// What caused this job to be created.
    pub created_by: JobCreator,
    /// Number of times this job's handler has been invoked and failed.
    pub try_count: u32,
    /// Opaque, job-type-specific payload.
    pub payload: serde_json::Value,
}

/// Lifecycle state of an on-chain transaction submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EthTxStatus {
    /// Built but not yet broadcast.
    Unsent,
    /// Broadcast to the network.
    Sent,
    /// Included in a block.
    Mined,
    /// Was mined but the block was later orphaned.
    Uncle,
}

/// A persisted contract-log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthLog {
    /// Primary key.
    pub id: EthLogId,
    /// Hash of the transaction that emitted this log.
    pub tx_hash: Hash32,
    /// Block number the log was included in.
    pub block_number: u64,
    /// The contract address that emitted the log.
    pub address: EthAddress,
    /// Raw (non-indexed) log data.
    pub data: Blob,
    /// Indexed topics; `topics[0]` is the event digest. 1..=4 entries.
    pub topics: Vec<Hash32>,
    /// The job this log was translated into, once the scheduler has run.
    pub job: Option<JobId>,
    /// Number of times the scheduler has failed to translate this log.
    pub failures: u32,
    /// `true` once the scheduler has decided this log will never produce a
    /// job (duplicate, already-processing, or a matched deletion event).
    pub ignore: bool,
}

/// A submitted on-chain transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthTx {
    /// Primary key.
    pub id: EthTxId,
    /// The transaction hash, once known.
    pub hash: Option<Hash32>,
    /// The contract method this transaction calls.
    pub method: String,
    /// Lifecycle state.
    pub status: EthTxStatus,
    /// The job that submitted this transaction.
    pub job: JobId,
    /// When this transaction was issued.
    pub issued_at: DateTime<Utc>,
    /// Sending address.
    pub addr_from: EthAddress,
    /// Destination address (the contract).
    pub addr_to: EthAddress,
    /// Transaction nonce.
    pub nonce: u64,
    /// Gas price, in wei.
    pub gas_price: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Raw encoded transaction bytes.
    pub raw: Blob,
    /// What kind of entity this transaction concerns.
    pub related_type: RelatedType,
    /// The entity this transaction concerns.
    pub related_id: uuid::Uuid,
}

/// A dynamic, hot-reloadable configuration cell, keyed by one of the well-known strings in
/// [`crate::config::setting_keys`]. Distinct from [`crate::config::Config`], which is loaded once
/// from a file at startup and never written back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    /// Primary key; one of `crate::config::setting_keys::*`.
    pub name: String,
    /// The current value, stored as text regardless of its logical type.
    pub value: String,
    /// Operator-facing description of what this setting controls.
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn eth_address_base64_round_trips() {
        let addr = EthAddress([7u8; 20]);
        let json = serde_json::to_string(&addr).expect("serialize");
        let back: EthAddress = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(addr, back);
    }

    #[test]
    fn eth_address_rejects_wrong_length() {
        let err = EthAddress::from_slice(&[0u8; 19]).unwrap_err();
        assert_eq!(err.code(), "CORE_DECODE");
    }

    #[test]
    fn channel_balance_invariant() {
        let mut ch = sample_channel();
        ch.total_deposit = 100;
        ch.receipt_balance = 100;
        assert!(ch.balance_invariant_holds());
        ch.receipt_balance = 101;
        assert!(!ch.balance_invariant_holds());
    }

    #[test]
    fn service_status_transitions_match_4_1() {
        use ServiceStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Suspended));
        assert!(Pending.can_transition_to(Terminated));
        assert!(Active.can_transition_to(Suspended));
        assert!(Active.can_transition_to(Terminated));
        assert!(Suspended.can_transition_to(Active));
        assert!(Suspended.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Active));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Suspended.can_transition_to(Pending));
    }

    fn sample_channel() -> Channel {
        Channel {
            id: ChannelId::new(),
            agent: EthAddress([1u8; 20]),
            client: EthAddress([2u8; 20]),
            offering: OfferingId::new(),
            block: 10,
            total_deposit: 0,
            receipt_balance: 0,
            receipt_signature: None,
            channel_status: ChannelStatus::Active,
            service_status: ServiceStatus::Pending,
            service_status_changed_at: Utc::now(),
            username: "c".into(),
            password: PasswordHash {
                hash: Blob(vec![]),
                salt: Blob(vec![]),
            },
        }
    }
}
