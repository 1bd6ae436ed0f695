//! The three log filters the ingestor issues every iteration.

use ethers::types::{Address, Filter, H256, U64};

use svcchan_types::events::{event_digest, EventKind};

fn topic(kind: EventKind) -> H256 {
    use EventKind::*;
    let signature = match kind {
        TokenApproval => "Approval(address,address,uint256)",
        TokenTransfer => "Transfer(address,address,uint256)",
        ChannelCreated => "LogChannelCreated(address,address,bytes32,uint192)",
        ChannelToppedUp => "LogChannelToppedUp(address,address,bytes32,uint192,uint192)",
        ChannelCloseRequested => "LogChannelCloseRequested(address,address,bytes32,uint192)",
        CooperativeClose => "LogCooperativeChannelClose(address,address,bytes32,uint192,uint192)",
        UncooperativeClose => {
            "LogUnCooperativeChannelClose(address,address,bytes32,uint192,uint192)"
        }
        OfferingCreated => "LogOfferingCreated(address,bytes32,uint16)",
        OfferingDeleted => "LogOfferingDeleted(address,bytes32)",
        OfferingPoppedUp => "LogOfferingPopedUp(address,bytes32)",
        OfferingEndpoint => "LogOfferingEndpoint(address,address,bytes32,bytes32)",
    };
    H256::from(event_digest(signature).0)
}

/// The agent filter: no topic[0] restriction, `topic[1]` is one of the caller's in-use account
/// addresses.
pub fn agent_filter(
    token_contract: Address,
    service_contract: Address,
    in_use_addresses: &[Address],
    from_block: u64,
    to_block: u64,
) -> Filter {
    let topic1: Vec<H256> = in_use_addresses.iter().map(address_topic).collect();
    Filter::new()
        .address(vec![token_contract, service_contract])
        .topic1(topic1)
        .from_block(U64::from(from_block))
        .to_block(U64::from(to_block))
}

/// The client filter: topic[0] restricted to the events a client side cares about, `topic[2]` is
/// one of the in-use addresses.
pub fn client_filter(
    token_contract: Address,
    service_contract: Address,
    in_use_addresses: &[Address],
    from_block: u64,
    to_block: u64,
) -> Filter {
    let topics0 = vec![
        topic(EventKind::ChannelCreated),
        topic(EventKind::ChannelToppedUp),
        topic(EventKind::ChannelCloseRequested),
        topic(EventKind::OfferingEndpoint),
        topic(EventKind::CooperativeClose),
        topic(EventKind::UncooperativeClose),
        topic(EventKind::TokenApproval),
        topic(EventKind::TokenTransfer),
    ];
    let topic2: Vec<H256> = in_use_addresses.iter().map(address_topic).collect();
    Filter::new()
        .address(vec![token_contract, service_contract])
        .topic0(topics0)
        .topic2(topic2)
        .from_block(U64::from(from_block))
        .to_block(U64::from(to_block))
}

/// The offering filter: range `[fresh, last]`, restricted to offering lifecycle events.
pub fn offering_filter(service_contract: Address, fresh_block: u64, to_block: u64) -> Filter {
    let topics0 = vec![
        topic(EventKind::OfferingCreated),
        topic(EventKind::OfferingDeleted),
        topic(EventKind::OfferingPoppedUp),
    ];
    Filter::new()
        .address(service_contract)
        .topic0(topics0)
        .from_block(U64::from(fresh_block))
        .to_block(U64::from(to_block))
}

fn address_topic(addr: &Address) -> H256 {
    H256::from(*addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offering_filter_only_covers_offering_events() {
        let f = offering_filter(Address::zero(), 10, 20);
        assert_eq!(f.get_from_block(), Some(U64::from(10)));
        assert_eq!(f.get_to_block(), Some(U64::from(20)));
    }
}
