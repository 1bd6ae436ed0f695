#![forbid(unsafe_code)]

//! Durable entity storage for the svcchan control plane, backed by
//! PostgreSQL through `sqlx`. Every cross-entity invariant in the data model is enforced
//! here, inside a transaction, rather than left to callers.

pub mod accounts;
pub mod billing;
pub mod endpoints;
pub mod error;
pub mod eth_log;
pub mod eth_tx;
pub mod jobs;
pub mod lifecycle;
pub mod offering;
pub mod settings;

pub use error::StoreError;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Embedded at compile time from `migrations/`; applied on every
/// [`Store::connect`] and by `#[sqlx::test]` fixtures.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// A handle to the PostgreSQL-backed store. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Opens a connection pool against `database_url` and brings the
    /// schema up to date with the bundled migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Builds a store directly from an existing pool, e.g. in tests.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Exposes the underlying pool for components that need raw access
    /// (the log ingestor's batch insert, the billing monitors' bespoke
    /// aggregate queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
