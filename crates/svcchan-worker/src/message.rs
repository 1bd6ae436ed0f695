//! Deterministic byte packing for the agent's offering announcement. The per-channel endpoint
//! credential message is built by the `svcchan-endpoint` crate instead, since it is sealed and
//! signed rather than hashed in place. No `Product`/`Template` store accessor exists, so the
//! offering message is built entirely from [`Offering`]'s own columns rather than pulling in the
//! product catalog it was configured from.

use svcchan_types::model::{BillingType, Offering, UnitType};

fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_optional_u64(buf: &mut Vec<u8>, v: Option<u64>) {
    match v {
        Some(v) => {
            buf.push(1);
            push_u64(buf, v);
        }
        None => {
            buf.push(0);
            push_u64(buf, 0);
        }
    }
}

fn push_country(buf: &mut Vec<u8>, country: &str) {
    let mut code = [0u8; 2];
    for (slot, byte) in code.iter_mut().zip(country.as_bytes()) {
        *slot = *byte;
    }
    buf.extend_from_slice(&code);
}

/// The preimage an agent signs and hashes to announce an offering. Every
/// field `registerServiceOffering`'s hash argument must commit to is included; fields the contract
/// never sees (msg_status bookkeeping) are not.
pub fn pack_offering_message(offering: &Offering) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(&offering.agent.0);
    buf.extend_from_slice(offering.product.as_uuid().as_bytes());
    buf.extend_from_slice(offering.template.as_uuid().as_bytes());
    push_country(&mut buf, &offering.country);
    buf.push(match offering.unit_type {
        UnitType::Seconds => 0,
        UnitType::Units => 1,
    });
    buf.push(match offering.billing_type {
        BillingType::Prepaid => 0,
        BillingType::Postpaid => 1,
    });
    push_u64(&mut buf, offering.setup_price);
    push_u64(&mut buf, offering.unit_price);
    push_u64(&mut buf, offering.min_units);
    push_optional_u64(&mut buf, offering.max_unit);
    buf.extend_from_slice(&offering.billing_interval.to_be_bytes());
    buf.extend_from_slice(&offering.max_billing_unit_lag.to_be_bytes());
    buf.extend_from_slice(&offering.max_suspend_time.to_be_bytes());
    push_optional_u64(&mut buf, offering.max_inactive_time_sec);
    buf.extend_from_slice(&offering.supply.to_be_bytes());
    buf.push(offering.free_units);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcchan_types::ids::{OfferingId, ProductId, TemplateId};
    use svcchan_types::model::{Blob, EthAddress, Hash32, OfferStatus, OfferingMsgStatus};

    fn sample_offering() -> Offering {
        Offering {
            id: OfferingId::new(),
            agent: EthAddress([1u8; 20]),
            product: ProductId::new(),
            template: TemplateId::new(),
            hash: Hash32([0u8; 32]),
            is_local: true,
            msg_status: OfferingMsgStatus::Unpublished,
            offer_status: OfferStatus::Empty,
            supply: 10,
            country: "US".into(),
            unit_type: UnitType::Seconds,
            billing_type: BillingType::Prepaid,
            setup_price: 100,
            unit_price: 5,
            min_units: 60,
            max_unit: Some(3600),
            billing_interval: 3600,
            max_billing_unit_lag: 10,
            max_suspend_time: 600,
            max_inactive_time_sec: None,
            free_units: 2,
            raw: Blob(Vec::new()),
        }
    }

    #[test]
    fn pack_offering_message_is_deterministic() {
        let offering = sample_offering();
        assert_eq!(pack_offering_message(&offering), pack_offering_message(&offering));
    }

    #[test]
    fn pack_offering_message_reflects_field_changes() {
        let mut a = sample_offering();
        let b_packed = pack_offering_message(&a);
        a.unit_price += 1;
        let a_packed = pack_offering_message(&a);
        assert_ne!(a_packed, b_packed);
    }

}
