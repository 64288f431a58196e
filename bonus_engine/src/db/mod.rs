//! Storage layer.
//!
//! Repository traits with an in-memory backend and a PostgreSQL backend on
//! top of a pooled [`Database`].

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};

pub mod config;
pub mod errors;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{
    BonusRepository, CashbackLevelRepository, DEFAULT_PAGE_SIZE, Page, TemplateRepository,
};

/// Pooled PostgreSQL connection shared by [`PgStore`] and the wallet
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Open the pool described by `config`.
    ///
    /// ```no_run
    /// use bonus_engine::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let db = Database::new(&DatabaseConfig::from_env()).await?;
    ///     db.store().migrate().await?;
    ///     db.health_check().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        log::debug!(
            "Opened bonus store pool ({}..{} connections)",
            config.min_connections,
            config.max_connections
        );
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Repository backend on this pool
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    /// Round trip to the server, bounded by the default query timeout
    pub async fn health_check(&self) -> StoreResult<()> {
        timeouts::with_default_timeout(async {
            sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
            Ok(())
        })
        .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
