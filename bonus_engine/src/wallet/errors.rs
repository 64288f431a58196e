//! Wallet error types.

use std::time::Duration;
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Wallet call did not answer in time
    #[error("Wallet call timed out after {0:?}")]
    Timeout(Duration),

    /// Wallet service could not be reached
    #[error("Wallet service unavailable: {0}")]
    Unavailable(String),

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Idempotency key reused for a different movement
    #[error("Idempotency key {0} was already used for a different transaction")]
    IdempotencyMismatch(String),

    /// Stored reason could not be (de)serialised
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WalletError {
    /// Transient failures worth retrying. Retrying is always safe because
    /// every call carries an idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::Timeout(_) | WalletError::Unavailable(_) | WalletError::Database(_)
        )
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Database(_) | WalletError::Serialization(_) => {
                "Internal server error".to_string()
            }
            WalletError::Unavailable(_) => "Wallet service unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
