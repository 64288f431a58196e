//! Database query timeout helpers
//!
//! Wraps storage futures so a stuck connection surfaces as
//! [`StoreError::Timeout`] instead of hanging a worker.

use std::time::Duration;
use tokio::time::timeout;

use super::errors::{StoreError, StoreResult};

/// Default timeout for database queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for transactions (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a storage operation with timeout
///
/// # Example
///
/// ```no_run
/// use bonus_engine::db::timeouts::{with_timeout, DEFAULT_QUERY_TIMEOUT};
/// # async fn example(pool: &sqlx::PgPool) -> bonus_engine::db::StoreResult<()> {
/// with_timeout(DEFAULT_QUERY_TIMEOUT, async {
///     sqlx::query("SELECT 1").execute(pool).await?;
///     Ok(())
/// })
/// .await
/// # }
/// ```
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> StoreResult<T>
where
    F: std::future::Future<Output = StoreResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}

/// Execute a query with the default timeout (5 seconds)
pub async fn with_default_timeout<F, T>(future: F) -> StoreResult<T>
where
    F: std::future::Future<Output = StoreResult<T>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}

/// Execute a transaction with the transaction timeout (10 seconds)
pub async fn with_transaction_timeout<F, T>(future: F) -> StoreResult<T>
where
    F: std::future::Future<Output = StoreResult<T>>,
{
    with_timeout(DEFAULT_TRANSACTION_TIMEOUT, future).await
}
