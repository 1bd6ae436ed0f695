//! The `setting` table: hot-reloadable tuning cells distinct from the static TOML
//! [`svcchan_types::config::Config`].

use svcchan_types::config::{setting_keys, DynamicSettings};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Reads a single setting's raw text value.
    pub async fn get_setting(&self, name: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM setting WHERE name = $1")
                .bind(name)
                .fetch_optional(self.pool())
                .await?;
        Ok(value)
    }

    /// Upserts a setting's value.
    pub async fn set_setting(&self, name: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO setting (name, value) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(name)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Loads the dynamic settings the log ingestor and scheduler need every
    /// iteration, in one round trip.
    pub async fn load_dynamic_settings(&self) -> Result<DynamicSettings, StoreError> {
        let min_confirmations = self
            .get_setting(setting_keys::MIN_CONFIRMATIONS)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let fresh_offerings_horizon = self
            .get_setting(setting_keys::FRESH_OFFERINGS_HORIZON)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let max_event_retry = self
            .get_setting(setting_keys::MAX_EVENT_RETRY)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(DynamicSettings {
            min_confirmations,
            fresh_offerings_horizon,
            max_event_retry,
        })
    }
}
