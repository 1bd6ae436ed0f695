//! `Offering` persistence.

use uuid::Uuid;

use svcchan_types::ids::OfferingId;
use svcchan_types::model::{Blob, Hash32, Offering, OfferingMsgStatus, OfferStatus};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Loads an offering by primary key.
    pub async fn get_offering(&self, id: OfferingId) -> Result<Option<Offering>, StoreError> {
        let row = sqlx::query_as::<_, OfferingRow>(
            "SELECT id, agent, product, template, hash, is_local, msg_status, offer_status, \
             supply, country, unit_type, billing_type, setup_price, unit_price, min_units, \
             max_unit, billing_interval, max_billing_unit_lag, max_suspend_time, \
             max_inactive_time_sec, free_units, raw FROM offering WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.map(OfferingRow::into_offering).transpose()
    }

    /// Advances `msg_status`.
    pub async fn update_offering_msg_status(
        &self,
        id: OfferingId,
        status: OfferingMsgStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE offering SET msg_status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(msg_status_str(status))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Sets the agent's registration intent.
    pub async fn update_offering_offer_status(
        &self,
        id: OfferingId,
        status: OfferStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE offering SET offer_status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(offer_status_str(status))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Records the just-computed canonical hash and signed message bytes and
    /// advances the offering toward on-chain publication in one write.
    pub async fn set_offering_published(
        &self,
        id: OfferingId,
        hash: Hash32,
        raw: &Blob,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE offering SET hash = $2, raw = $3, msg_status = 'bchain_publishing', \
             offer_status = 'register' WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(hash.0.as_slice())
        .bind(raw.0.as_slice())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// The access template (and its content hash) and payment-receiver URL
    /// an offering's product carries, joined directly rather than through a
    /// dedicated `Product` accessor.
    pub async fn endpoint_meta_for_offering(
        &self,
        offering_id: Uuid,
    ) -> Result<Option<OfferingEndpointMeta>, StoreError> {
        let row = sqlx::query_as::<_, OfferingEndpointMetaRow>(
            "SELECT p.access_template, t.hash AS template_hash, p.service_endpoint_address \
             FROM offering o \
             JOIN product p ON p.id = o.product \
             JOIN template t ON t.id = p.access_template \
             WHERE o.id = $1",
        )
        .bind(offering_id)
        .fetch_optional(self.pool())
        .await?;
        match row {
            None => Ok(None),
            Some(r) => Ok(Some(OfferingEndpointMeta {
                access_template: r.access_template,
                template_hash: Hash32::from_slice(&r.template_hash)
                    .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?,
                service_endpoint_address: r.service_endpoint_address,
            })),
        }
    }
}

/// See [`Store::endpoint_meta_for_offering`].
pub struct OfferingEndpointMeta {
    pub access_template: Uuid,
    pub template_hash: Hash32,
    pub service_endpoint_address: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OfferingEndpointMetaRow {
    access_template: Uuid,
    template_hash: Vec<u8>,
    service_endpoint_address: Option<String>,
}

fn msg_status_str(status: OfferingMsgStatus) -> &'static str {
    match status {
        OfferingMsgStatus::Unpublished => "unpublished",
        OfferingMsgStatus::BchainPublishing => "bchain_publishing",
        OfferingMsgStatus::BchainPublished => "bchain_published",
        OfferingMsgStatus::MsgChannelPublished => "msg_channel_published",
    }
}

fn parse_msg_status(s: &str) -> OfferingMsgStatus {
    match s {
        "bchain_publishing" => OfferingMsgStatus::BchainPublishing,
        "bchain_published" => OfferingMsgStatus::BchainPublished,
        "msg_channel_published" => OfferingMsgStatus::MsgChannelPublished,
        _ => OfferingMsgStatus::Unpublished,
    }
}

fn offer_status_str(status: OfferStatus) -> &'static str {
    match status {
        OfferStatus::Empty => "empty",
        OfferStatus::Register => "register",
        OfferStatus::Remove => "remove",
    }
}

fn parse_offer_status(s: &str) -> OfferStatus {
    match s {
        "register" => OfferStatus::Register,
        "remove" => OfferStatus::Remove,
        _ => OfferStatus::Empty,
    }
}

fn parse_unit_type(s: &str) -> svcchan_types::model::UnitType {
    match s {
        "units" => svcchan_types::model::UnitType::Units,
        _ => svcchan_types::model::UnitType::Seconds,
    }
}

fn parse_billing_type(s: &str) -> svcchan_types::model::BillingType {
    match s {
        "postpaid" => svcchan_types::model::BillingType::Postpaid,
        _ => svcchan_types::model::BillingType::Prepaid,
    }
}

#[derive(sqlx::FromRow)]
struct OfferingRow {
    id: Uuid,
    agent: Vec<u8>,
    product: Uuid,
    template: Uuid,
    hash: Vec<u8>,
    is_local: bool,
    msg_status: String,
    offer_status: String,
    supply: i32,
    country: String,
    unit_type: String,
    billing_type: String,
    setup_price: i64,
    unit_price: i64,
    min_units: i64,
    max_unit: Option<i64>,
    billing_interval: i32,
    max_billing_unit_lag: i32,
    max_suspend_time: i32,
    max_inactive_time_sec: Option<i64>,
    free_units: i16,
    raw: Vec<u8>,
}

impl OfferingRow {
    fn into_offering(self) -> Result<Offering, StoreError> {
        use svcchan_types::model::{EthAddress, Hash32};
        Ok(Offering {
            id: self.id.into(),
            agent: EthAddress::from_slice(&self.agent)
                .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?,
            product: self.product.into(),
            template: self.template.into(),
            hash: Hash32::from_slice(&self.hash)
                .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?,
            is_local: self.is_local,
            msg_status: parse_msg_status(&self.msg_status),
            offer_status: parse_offer_status(&self.offer_status),
            supply: self.supply as u32,
            country: self.country,
            unit_type: parse_unit_type(&self.unit_type),
            billing_type: parse_billing_type(&self.billing_type),
            setup_price: self.setup_price as u64,
            unit_price: self.unit_price as u64,
            min_units: self.min_units as u64,
            max_unit: self.max_unit.map(|v| v as u64),
            billing_interval: self.billing_interval as u32,
            max_billing_unit_lag: self.max_billing_unit_lag as u32,
            max_suspend_time: self.max_suspend_time as u32,
            max_inactive_time_sec: self.max_inactive_time_sec.map(|v| v as u64),
            free_units: self.free_units as u8,
            raw: Blob(self.raw),
        })
    }
}
