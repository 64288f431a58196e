//! Cashback error types.

use thiserror::Error;

use crate::db::StoreError;

/// Cashback tier engine errors
#[derive(Debug, Error)]
pub enum CashbackError {
    /// No cashback levels exist yet
    #[error("No cashback levels configured")]
    NoLevelsConfigured,

    /// Tier number already used
    #[error("Cashback tier {0} already exists")]
    DuplicateTier(u32),

    /// Tier not found
    #[error("Cashback tier {0} not found")]
    LevelNotFound(u32),

    /// Tiers must be strictly ordered by minimum monthly wager
    #[error("Cashback levels out of order: {0}")]
    LevelOrderViolation(String),

    /// Invalid level fields
    #[error("Invalid cashback level: {0}")]
    Validation(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl CashbackError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            CashbackError::Store(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for cashback operations
pub type CashbackResult<T> = Result<T, CashbackError>;
