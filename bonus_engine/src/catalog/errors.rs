//! Catalog error types.

use thiserror::Error;

use super::models::{TemplateId, TemplateStatus};
use crate::db::StoreError;

/// Template catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Missing or inconsistent template fields
    #[error("Invalid template: {0}")]
    Validation(String),

    /// Template not found
    #[error("Template {0} not found")]
    NotFound(TemplateId),

    /// Status change outside draft -> active <-> paused
    #[error("Invalid template status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: TemplateStatus,
        to: TemplateStatus,
    },

    /// Financial fields are frozen once a player holds a bonus from the template
    #[error(
        "Template {template_id} is referenced by claimed bonuses; locked fields: {}",
        .fields.join(", ")
    )]
    TemplateImmutableFieldsLocked {
        template_id: TemplateId,
        fields: Vec<&'static str>,
    },

    /// Referenced templates can't be deleted
    #[error("Template {template_id} is referenced by {bonuses} bonuses and cannot be deleted")]
    TemplateInUse { template_id: TemplateId, bonuses: u64 },

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl CatalogError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            CatalogError::Store(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
