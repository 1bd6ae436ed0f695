//! The closed set of job type tags and their per-type scheduling configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle state of a [`crate::model::Job`]. Transitions form a DAG with sinks `Done`, `Failed`,
/// `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Eligible for collection once `not_before` has passed.
    Active,
    /// The handler returned success.
    Done,
    /// The handler exhausted its retry budget.
    Failed,
    /// Preempted by `alterServiceStatus`'s `cancelOthers`, or by an operator.
    Canceled,
}

/// The closed set of job type tags dispatched by the worker and produced by the event scheduler or
/// a billing monitor. This is a string newtype rather than a Rust `enum` because job rows persist
/// the tag as opaque text and new tags must never require a schema migration to add — but the set
/// of *known* tags the worker can dispatch to is still closed and declared once, in [`JOB_TYPES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobType(pub &'static str);

impl JobType {
    /// Returns the wire/storage representation of this tag.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Per-type tuning for the job queue's retry policy.
#[derive(Debug, Clone, Copy)]
pub struct JobTypeConfig {
    /// The tag this configuration applies to.
    pub job_type: JobType,
    /// Maximum number of handler invocations before the job is marked
    /// `Failed`. `0` means unbounded (retried forever).
    pub try_limit: u32,
    /// Delay before a failed-but-retriable job becomes eligible again.
    pub try_period: Duration,
    /// If `true`, more than one active job of this type may exist for the
    /// same `related_id` at once.
    pub duplicated: bool,
}

macro_rules! job_types {
    ($($const_name:ident => ($tag:literal, $try_limit:expr, $try_period_ms:expr, $duplicated:expr)),* $(,)?) => {
        $(
            #[doc = concat!("Job type tag `\"", $tag, "\"`.")]
            pub const $const_name: JobType = JobType($tag);
        )*

        /// The full, closed table of job types the worker can dispatch,
        /// declared once at startup.
        pub const JOB_TYPES: &[JobTypeConfig] = &[
            $(
                JobTypeConfig {
                    job_type: $const_name,
                    try_limit: $try_limit,
                    try_period: Duration::from_millis($try_period_ms),
                    duplicated: $duplicated,
                },
            )*
        ];
    };
}

job_types! {
    // Offering lifecycle.
    AGENT_PRE_SERVICE_OFFERING_MSG_BC_PUBLISH => ("agent-pre-offering-msg-bc-publish", 5, 10_000, false),
    AGENT_AFTER_OFFERING_MSG_BC_PUBLISH => ("agent-after-offering-msg-bc-publish", 0, 15_000, false),
    AGENT_PRE_OFFERING_MSG_SOMC_PUBLISH => ("agent-pre-offering-msg-somc-publish", 5, 10_000, false),
    CLIENT_AFTER_OFFERING_MSG_BC_PUBLISH => ("client-after-offering-msg-bc-publish", 0, 15_000, true),

    // Channel creation and endpoint publication.
    AGENT_AFTER_CHANNEL_CREATE => ("agent-after-channel-create", 5, 10_000, false),
    AGENT_AFTER_CHANNEL_TOP_UP => ("agent-after-channel-top-up", 5, 10_000, false),
    AGENT_PRE_ENDPOINT_MSG_CREATE => ("agent-pre-endpoint-msg-create", 5, 10_000, false),
    AGENT_PRE_ENDPOINT_MSG_SOMC_PUBLISH => ("agent-pre-endpoint-msg-somc-publish", 5, 10_000, false),
    AFTER_ENDPOINT_MSG_SOMC_PUBLISH => ("after-endpoint-msg-somc-publish", 5, 10_000, false),

    // Channel close flow.
    AGENT_AFTER_UNCOOP_CLOSE_REQUEST => ("agent-after-uncoop-close-request", 5, 10_000, false),
    AGENT_PRE_COOPERATIVE_CLOSE => ("agent-pre-cooperative-close", 5, 10_000, false),
    AGENT_AFTER_COOPERATIVE_CLOSE => ("agent-after-cooperative-close", 5, 10_000, false),
    AGENT_AFTER_UNCOOPERATIVE_CLOSE => ("agent-after-uncooperative-close", 5, 10_000, false),
    AGENT_PRE_SERVICE_TERMINATE => ("agent-pre-service-terminate", 0, 10_000, true),
    AGENT_PRE_SERVICE_SUSPEND => ("agent-pre-service-suspend", 0, 10_000, false),
    AGENT_PRE_SERVICE_UNSUSPEND => ("agent-pre-service-unsuspend", 0, 10_000, false),

    // Account balance management.
    PRE_ACCOUNT_ADD_BALANCE_APPROVE => ("pre-account-add-balance-approve", 5, 10_000, false),
    AFTER_ACCOUNT_ADD_BALANCE => ("after-account-add-balance", 5, 10_000, false),
    PRE_ACCOUNT_ADD_BALANCE => ("pre-account-add-balance", 5, 10_000, false),
    AFTER_ACCOUNT_RETURN_BALANCE => ("after-account-return-balance", 5, 10_000, false),
    ACCOUNT_ADD_CHECK_BALANCE => ("account-add-check-balance", 0, 60_000, false),

    // Client-side stub declared as future work. The handler
    // table carries this tag but the handler is a no-op that logs and
    // returns success; an implementer must not invent semantics for it.
    CLIENT_AFTER_UNCOOP_CLOSE_REQUEST => ("client-after-uncoop-close-request", 5, 10_000, false),
}

/// Looks up the scheduling configuration for a job type tag, if it is one of
/// the closed set in [`JOB_TYPES`].
pub fn config_for(job_type: &str) -> Option<&'static JobTypeConfig> {
    JOB_TYPES.iter().find(|c| c.job_type.as_str() == job_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_declared_tag_is_unique() {
        let mut tags: Vec<&str> = JOB_TYPES.iter().map(|c| c.job_type.as_str()).collect();
        let before = tags.len();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(before, tags.len(), "duplicate job type tag declared");
    }

    #[test]
    fn config_for_unknown_tag_is_none() {
        assert!(config_for("no-such-job-type").is_none());
    }

    #[test]
    fn terminate_is_configured_unbounded_and_duplicated() {
        let cfg = config_for(AGENT_PRE_SERVICE_TERMINATE.as_str()).expect("declared");
        assert_eq!(cfg.try_limit, 0);
        assert!(cfg.duplicated);
    }
}
