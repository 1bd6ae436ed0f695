//! Opaque 128-bit identifiers for every durable entity.
//!
//! Every id is a thin [`uuid::Uuid`] wrapper so that entity references
//! cannot be swapped for one another by accident at the type level, while
//! still serializing to and from the plain text form the rest of the system
//! (JSON payloads, SQL columns, job `related_id` fields) expects.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a new random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the wrapped UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

entity_id!(AccountId, "Primary key of an [`crate::model::Account`].");
entity_id!(UserId, "Primary key of a [`crate::model::User`].");
entity_id!(TemplateId, "Primary key of a [`crate::model::Template`].");
entity_id!(ProductId, "Primary key of a [`crate::model::Product`].");
entity_id!(OfferingId, "Primary key of an [`crate::model::Offering`].");
entity_id!(ChannelId, "Primary key of a [`crate::model::Channel`].");
entity_id!(SessionId, "Primary key of a [`crate::model::Session`].");
entity_id!(EndpointId, "Primary key of an [`crate::model::Endpoint`].");
entity_id!(JobId, "Primary key of a [`crate::model::Job`].");
entity_id!(EthLogId, "Primary key of an [`crate::model::EthLog`].");
entity_id!(EthTxId, "Primary key of an [`crate::model::EthTx`].");

/// The kind of entity a [`crate::model::Job`] or [`crate::model::EthTx`] is
/// bound to, used to resolve `related_id` without a second lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedType {
    /// The job/tx concerns an [`crate::model::Offering`].
    Offering,
    /// The job/tx concerns a [`crate::model::Channel`].
    Channel,
    /// The job/tx concerns an [`crate::model::Endpoint`].
    Endpoint,
    /// The job/tx concerns an [`crate::model::Account`].
    Account,
}

impl fmt::Display for RelatedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offering => "offering",
            Self::Channel => "channel",
            Self::Endpoint => "endpoint",
            Self::Account => "account",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_round_trip() {
        let id = ChannelId::new();
        let text = id.to_string();
        let parsed: ChannelId = text.parse().expect("valid uuid text");
        assert_eq!(id, parsed);
    }

    #[test]
    fn ids_of_different_entities_are_distinct_types() {
        // This is a compile-time property: the line below would not compile
        // if `ChannelId` and `OfferingId` unified.
        let channel = ChannelId::new();
        let offering = OfferingId::new();
        assert_ne!(channel.as_uuid(), offering.as_uuid());
    }
}
