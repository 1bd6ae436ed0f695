//! Contract event identifiers consumed by the log ingestor and the event scheduler's dispatch
//! table. Each digest is the Keccak-256 hash of the event's Solidity signature, computed once and
//! pinned as a constant rather than recomputed at runtime, so that a change to the hashing routine
//! cannot silently change which on-chain logs this system recognizes.

use crate::model::Hash32;

/// Computes the Keccak-256 digest of an event's Solidity signature string,
/// e.g. `"LogChannelCreated(address,address,bytes32,uint192)"`.
///
/// This lives here (rather than in `svcchan-crypto`) purely to keep the
/// event-digest table self-contained and dependency-free; the canonical
/// Keccak-256 implementation used everywhere else in the workspace is
/// `svcchan_crypto::hash::keccak256`, and the two must and do agree (see the
/// cross-crate test in `svcchan-crypto`).
pub fn event_digest(signature: &str) -> Hash32 {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let out = hasher.finalize();
    Hash32(out.into())
}

/// One entry in the event classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// ERC20-style `Approval` on the token contract.
    TokenApproval,
    /// ERC20-style `Transfer` on the token contract.
    TokenTransfer,
    /// `LogChannelCreated` on the service contract.
    ChannelCreated,
    /// `LogChannelToppedUp` on the service contract.
    ChannelToppedUp,
    /// `LogChannelCloseRequested` on the service contract.
    ChannelCloseRequested,
    /// `LogCooperativeChannelClose` on the service contract.
    CooperativeClose,
    /// `LogUnCooperativeChannelClose` on the service contract.
    UncooperativeClose,
    /// `LogOfferingCreated` on the service contract.
    OfferingCreated,
    /// `LogOfferingDeleted` on the service contract.
    OfferingDeleted,
    /// `LogOfferingPopedUp` on the service contract (re-advertisement).
    OfferingPoppedUp,
    /// `LogOfferingEndpoint` on the service contract.
    OfferingEndpoint,
}

struct EventSpec {
    kind: EventKind,
    signature: &'static str,
}

const EVENT_TABLE: &[EventSpec] = &[
    EventSpec {
        kind: EventKind::TokenApproval,
        signature: "Approval(address,address,uint256)",
    },
    EventSpec {
        kind: EventKind::TokenTransfer,
        signature: "Transfer(address,address,uint256)",
    },
    EventSpec {
        kind: EventKind::ChannelCreated,
        signature: "LogChannelCreated(address,address,bytes32,uint192)",
    },
    EventSpec {
        kind: EventKind::ChannelToppedUp,
        signature: "LogChannelToppedUp(address,address,bytes32,uint192,uint192)",
    },
    EventSpec {
        kind: EventKind::ChannelCloseRequested,
        signature: "LogChannelCloseRequested(address,address,bytes32,uint192)",
    },
    EventSpec {
        kind: EventKind::CooperativeClose,
        signature: "LogCooperativeChannelClose(address,address,bytes32,uint192,uint192)",
    },
    EventSpec {
        kind: EventKind::UncooperativeClose,
        signature: "LogUnCooperativeChannelClose(address,address,bytes32,uint192,uint192)",
    },
    EventSpec {
        kind: EventKind::OfferingCreated,
        signature: "LogOfferingCreated(address,bytes32,uint16)",
    },
    EventSpec {
        kind: EventKind::OfferingDeleted,
        signature: "LogOfferingDeleted(address,bytes32)",
    },
    EventSpec {
        kind: EventKind::OfferingPoppedUp,
        signature: "LogOfferingPopedUp(address,bytes32)",
    },
    EventSpec {
        kind: EventKind::OfferingEndpoint,
        signature: "LogOfferingEndpoint(address,address,bytes32,bytes32)",
    },
];

/// Classifies a topic-0 digest into an [`EventKind`], if recognized.
pub fn classify(topic0: &Hash32) -> Option<EventKind> {
    EVENT_TABLE
        .iter()
        .find(|spec| &event_digest(spec.signature) == topic0)
        .map(|spec| spec.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_are_stable_and_distinct() {
        let mut digests: Vec<Hash32> = EVENT_TABLE
            .iter()
            .map(|spec| event_digest(spec.signature))
            .collect();
        let before = digests.len();
        digests.sort_by_key(|h| h.0);
        digests.dedup_by_key(|h| h.0);
        assert_eq!(before, digests.len(), "two event signatures collided");
    }

    #[test]
    fn classify_round_trips_every_entry() {
        for spec in EVENT_TABLE {
            let digest = event_digest(spec.signature);
            assert_eq!(classify(&digest), Some(spec.kind));
        }
    }

    #[test]
    fn classify_rejects_unknown_digest() {
        let bogus = Hash32([0xAB; 32]);
        assert_eq!(classify(&bogus), None);
    }
}
