//! Storage error types.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors shared by every repository backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Template not found
    #[error("Template {0} not found")]
    TemplateNotFound(Uuid),

    /// Player bonus not found
    #[error("Bonus {0} not found")]
    BonusNotFound(Uuid),

    /// Cashback level not found
    #[error("Cashback level {0} not found")]
    LevelNotFound(u32),

    /// Unique key already taken
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Optimistic concurrency check failed
    #[error("Bonus {bonus_id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        bonus_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Operation timed out
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored column holds a value the engine does not know
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Stored document could not be (de)serialised
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
