//! Account and counter-party (`User`) persistence: in-use address lookups
//! for the log ingestor and balance refresh for account handlers and the billing monitors.

use bigdecimal::BigDecimal;
use sqlx::Row;

use svcchan_types::ids::{AccountId, UserId};
use svcchan_types::model::{Account, EthAddress, PublicKey65, User};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// The on-chain addresses of every account with `in_use = true`, scanned once per ingestor
    /// iteration.
    pub async fn in_use_addresses(&self) -> Result<Vec<EthAddress>, StoreError> {
        let rows = sqlx::query("SELECT address FROM account WHERE in_use = true")
            .fetch_all(self.pool())
            .await?;
        rows.into_iter()
            .map(|row| address_from_row(&row, "address"))
            .collect()
    }

    /// Resolves an on-chain address to the local account that owns it, if
    /// any.
    pub async fn find_account_id_by_address(
        &self,
        address: EthAddress,
    ) -> Result<Option<AccountId>, StoreError> {
        let id: Option<uuid::Uuid> = sqlx::query_scalar("SELECT id FROM account WHERE address = $1")
            .bind(address.0.as_slice())
            .fetch_optional(self.pool())
            .await?;
        Ok(id.map(AccountId))
    }

    /// Fetches one account by id.
    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT id, address, public_key, private_key_encrypted, is_default, in_use, name, \
             psc_balance, ptc_balance, eth_balance, last_balance_check FROM account WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.map(account_from_row).transpose()
    }

    /// Overwrites an account's three cached on-chain balances and bumps
    /// `last_balance_check`.
    pub async fn update_account_balances(
        &self,
        id: AccountId,
        psc_balance: BigDecimal,
        ptc_balance: BigDecimal,
        eth_balance: BigDecimal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE account SET psc_balance = $2, ptc_balance = $3, eth_balance = $4, \
             last_balance_check = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(psc_balance)
        .bind(ptc_balance)
        .bind(eth_balance)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Loads a counter-party `User` row by its on-chain address, if one has
    /// ever been recorded.
    pub async fn get_user_by_address(&self, address: EthAddress) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, address, public_key FROM app_user WHERE address = $1")
            .bind(address.0.as_slice())
            .fetch_optional(self.pool())
            .await?;
        row.map(|row| {
            let public_key_bytes: Option<Vec<u8>> = row.get("public_key");
            let public_key = public_key_bytes
                .map(|bytes| {
                    PublicKey65::from_slice(&bytes)
                        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))
                })
                .transpose()?;
            Ok(User {
                id: row.get::<uuid::Uuid, _>("id").into(),
                address: address_from_row(&row, "address")?,
                public_key,
            })
        })
        .transpose()
    }

    /// Finds the `User` row for `address`, inserting one if absent
    /// (idempotent by address; `agent-after-channel-create`).
    pub async fn find_or_create_user(
        &self,
        address: EthAddress,
        public_key: Option<PublicKey65>,
    ) -> Result<UserId, StoreError> {
        let mut tx = self.pool().begin().await?;
        let existing: Option<uuid::Uuid> = sqlx::query_scalar("SELECT id FROM app_user WHERE address = $1")
            .bind(address.0.as_slice())
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(id) = existing {
            if let Some(pk) = public_key {
                sqlx::query("UPDATE app_user SET public_key = $2 WHERE id = $1")
                    .bind(id)
                    .bind(pk.0.as_slice())
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            return Ok(UserId(id));
        }
        let id = uuid::Uuid::new_v4();
        sqlx::query("INSERT INTO app_user (id, address, public_key) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(address.0.as_slice())
            .bind(public_key.map(|pk| pk.0.to_vec()))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(UserId(id))
    }
}

fn address_from_row(row: &sqlx::postgres::PgRow, column: &str) -> Result<EthAddress, StoreError> {
    let bytes: Vec<u8> = row.get(column);
    EthAddress::from_slice(&bytes).map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn account_from_row(row: sqlx::postgres::PgRow) -> Result<Account, StoreError> {
    let address = address_from_row(&row, "address")?;
    let public_key_bytes: Vec<u8> = row.get("public_key");
    let public_key = PublicKey65::from_slice(&public_key_bytes)
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
    let private_key_encrypted: Vec<u8> = row.get("private_key_encrypted");
    Ok(Account {
        id: row.get::<uuid::Uuid, _>("id").into(),
        address,
        public_key,
        private_key_encrypted: private_key_encrypted.into(),
        is_default: row.get("is_default"),
        in_use: row.get("in_use"),
        name: row.get("name"),
        psc_balance: row.get("psc_balance"),
        ptc_balance: row.get("ptc_balance"),
        eth_balance: row.get("eth_balance"),
        last_balance_check: row.get("last_balance_check"),
    })
}
