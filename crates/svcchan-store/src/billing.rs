//! Aggregate queries backing the agent and client billing monitors. Each check here returns the set
//! of channel ids a monitor round should act on; the monitor itself drives `alter_service_status`
//! or the cheque flow.

use uuid::Uuid;

use svcchan_types::model::{BillingType, EthAddress, Hash32, UnitType};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Check 1/2: channels whose consumption has reached either the deposit ceiling or the offering's
    /// hard unit cap, scoped to `unit_type` so seconds- and units-billed offerings are evaluated
    /// separately.
    pub async fn channels_over_cap(&self, unit_type: UnitType) -> Result<Vec<Uuid>, StoreError> {
        let sum_column = match unit_type {
            UnitType::Seconds => "seconds_consumed",
            UnitType::Units => "units_used",
        };
        let sql = format!(
            "SELECT c.id FROM channel c \
             JOIN offering o ON o.id = c.offering \
             JOIN account a ON a.address = c.agent \
             LEFT JOIN (SELECT channel, COALESCE(SUM({sum_column}), 0) AS total \
                        FROM session GROUP BY channel) s ON s.channel = c.id \
             WHERE o.unit_type = $1 \
               AND c.service_status IN ('pending', 'active') \
               AND c.channel_status != 'pending' \
               AND a.in_use = true \
               AND (o.setup_price + COALESCE(s.total, 0) * o.unit_price >= c.total_deposit \
                    OR (o.max_unit IS NOT NULL AND COALESCE(s.total, 0) >= o.max_unit))"
        );
        let ids: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(unit_type_str(unit_type))
            .fetch_all(self.pool())
            .await?;
        Ok(ids)
    }

    /// Check 3: channels idle past the offering's inactivity window. A channel with no sessions yet has
    /// no `last_usage_time` and is never matched here, matching the `COALESCE(..., 0)` rule specifies
    /// for the cap checks (an unused channel trivially satisfies no terminal condition).
    pub async fn channels_inactive(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT c.id FROM channel c \
             JOIN offering o ON o.id = c.offering \
             JOIN account a ON a.address = c.agent \
             JOIN (SELECT channel, MAX(last_usage_time) AS last FROM session GROUP BY channel) s \
               ON s.channel = c.id \
             WHERE c.service_status IN ('pending', 'active', 'suspended') \
               AND c.channel_status != 'pending' \
               AND a.in_use = true \
               AND o.max_inactive_time_sec IS NOT NULL \
               AND s.last + make_interval(secs => o.max_inactive_time_sec) < now()",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    /// Check 4: suspended channels whose payer has caught back up (`lag <= max_billing_unit_lag`),
    /// candidates for reactivation.
    pub async fn channels_to_unsuspend(&self) -> Result<Vec<Uuid>, StoreError> {
        self.channels_by_lag("suspended", "<=").await
    }

    /// Check 6: active/pending channels whose payer has fallen behind (`lag > max_billing_unit_lag`),
    /// candidates for suspension.
    pub async fn channels_to_suspend(&self) -> Result<Vec<Uuid>, StoreError> {
        self.channels_by_lag("pending_active", ">").await
    }

    async fn channels_by_lag(&self, scope: &str, cmp: &str) -> Result<Vec<Uuid>, StoreError> {
        let status_filter = match scope {
            "suspended" => "c.service_status = 'suspended'",
            _ => "c.service_status IN ('pending', 'active')",
        };
        let sql = format!(
            "SELECT c.id FROM channel c \
             JOIN offering o ON o.id = c.offering \
             JOIN account a ON a.address = c.agent \
             LEFT JOIN (SELECT channel, COALESCE(SUM(seconds_consumed), 0) AS secs, \
                               COALESCE(SUM(units_used), 0) AS units \
                        FROM session GROUP BY channel) s ON s.channel = c.id \
             WHERE {status_filter} \
               AND c.channel_status != 'pending' \
               AND a.in_use = true \
               AND ( \
                 (CASE WHEN o.unit_type = 'seconds' THEN COALESCE(s.secs, 0) ELSE COALESCE(s.units, 0) END)::double precision \
                   / o.billing_interval \
                 - (c.receipt_balance - o.setup_price)::double precision / o.unit_price \
               ) {cmp} o.max_billing_unit_lag"
        );
        let ids: Vec<Uuid> = sqlx::query_scalar(&sql).fetch_all(self.pool()).await?;
        Ok(ids)
    }

    /// Check 5: channels suspended longer than the offering's tolerance, candidates for termination.
    pub async fn channels_over_suspended(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT c.id FROM channel c \
             JOIN offering o ON o.id = c.offering \
             JOIN account a ON a.address = c.agent \
             WHERE c.service_status = 'suspended' \
               AND a.in_use = true \
               AND c.service_status_changed_at + make_interval(secs => o.max_suspend_time) < now()",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    /// channels the local node holds as client, eligible for a billing-lag check this iteration, with
    /// everything the cheque builder and HTTP POST need.
    pub async fn client_billing_channels(&self) -> Result<Vec<ClientBillingChannel>, StoreError> {
        let rows = sqlx::query_as::<_, ClientBillingRow>(
            "SELECT c.id, c.agent, c.client, c.block, c.total_deposit, c.receipt_balance, \
                    o.hash AS offering_hash, o.unit_type, o.billing_type, o.setup_price, \
                    o.unit_price, o.billing_interval, p.service_endpoint_address AS payment_url \
             FROM channel c \
             JOIN offering o ON o.id = c.offering \
             JOIN product p ON p.id = o.product \
             JOIN account a ON a.address = c.client \
             WHERE c.channel_status = 'active' \
               AND c.service_status IN ('active', 'suspended') \
               AND a.in_use = true",
        )
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(ClientBillingRow::into_channel).collect()
    }

    /// usage sum feeding the client-side lag computation, metered the way the channel's offering bills
    /// (`seconds_consumed` or `units_used`).
    pub async fn channel_usage_sum(&self, channel: Uuid, unit_type: UnitType) -> Result<u64, StoreError> {
        let column = match unit_type {
            UnitType::Seconds => "seconds_consumed",
            UnitType::Units => "units_used",
        };
        let sql = format!("SELECT COALESCE(SUM({column}), 0) FROM session WHERE channel = $1");
        let total: i64 = sqlx::query_scalar(&sql).bind(channel).fetch_one(self.pool()).await?;
        Ok(total.max(0) as u64)
    }
}

/// A candidate channel for the client billing monitor's per-iteration lag
/// check, already carrying the offering's pricing terms and the agent's advertised payment endpoint
/// so the caller needs no further lookups before building and posting a cheque.
#[derive(Debug, Clone)]
pub struct ClientBillingChannel {
    pub channel_id: Uuid,
    pub agent: EthAddress,
    pub client: EthAddress,
    pub block: u64,
    pub total_deposit: u64,
    pub receipt_balance: u64,
    pub offering_hash: Hash32,
    pub unit_type: UnitType,
    pub billing_type: BillingType,
    pub setup_price: u64,
    pub unit_price: u64,
    pub billing_interval: u32,
    pub payment_url: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ClientBillingRow {
    id: Uuid,
    agent: Vec<u8>,
    client: Vec<u8>,
    block: i64,
    total_deposit: i64,
    receipt_balance: i64,
    offering_hash: Vec<u8>,
    unit_type: String,
    billing_type: String,
    setup_price: i64,
    unit_price: i64,
    billing_interval: i32,
    payment_url: Option<String>,
}

impl ClientBillingRow {
    fn into_channel(self) -> Result<ClientBillingChannel, StoreError> {
        Ok(ClientBillingChannel {
            channel_id: self.id,
            agent: EthAddress::from_slice(&self.agent)
                .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?,
            client: EthAddress::from_slice(&self.client)
                .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?,
            block: self.block as u64,
            total_deposit: self.total_deposit as u64,
            receipt_balance: self.receipt_balance as u64,
            offering_hash: Hash32::from_slice(&self.offering_hash)
                .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?,
            unit_type: parse_unit_type(&self.unit_type),
            billing_type: parse_billing_type(&self.billing_type),
            setup_price: self.setup_price as u64,
            unit_price: self.unit_price as u64,
            billing_interval: self.billing_interval as u32,
            payment_url: self.payment_url,
        })
    }
}

fn unit_type_str(t: UnitType) -> &'static str {
    match t {
        UnitType::Seconds => "seconds",
        UnitType::Units => "units",
    }
}

fn parse_unit_type(s: &str) -> UnitType {
    match s {
        "units" => UnitType::Units,
        _ => UnitType::Seconds,
    }
}

fn parse_billing_type(s: &str) -> BillingType {
    match s {
        "postpaid" => BillingType::Postpaid,
        _ => BillingType::Prepaid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_type_round_trips_through_storage_strings() {
        for t in [UnitType::Seconds, UnitType::Units] {
            assert_eq!(parse_unit_type(unit_type_str(t)), t);
        }
    }

    #[test]
    fn billing_type_defaults_to_prepaid_on_unknown() {
        assert_eq!(parse_billing_type("garbage"), BillingType::Prepaid);
    }
}
