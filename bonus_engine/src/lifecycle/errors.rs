//! Lifecycle error types.

use thiserror::Error;

use crate::{
    cashback::CashbackError,
    catalog::{CatalogError, TemplateId, TemplateStatus},
    db::StoreError,
    ledger::{BonusId, BonusStatus, LedgerError, TransitionKind},
    wallet::WalletError,
};

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum BonusError {
    /// Missing or malformed request fields
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Template not found
    #[error("Template {0} not found")]
    TemplateNotFound(TemplateId),

    /// Bonus not found
    #[error("Bonus {0} not found")]
    BonusNotFound(BonusId),

    /// Template does not accept claims
    #[error("Template {template_id} is {status}, not active")]
    TemplateInactive {
        template_id: TemplateId,
        status: TemplateStatus,
    },

    /// Player may not claim this template
    #[error("Eligibility not met: {0}")]
    EligibilityNotMet(String),

    /// Player already holds an open bonus from the template
    #[error("Template already claimed: bonus {existing} is {status}")]
    AlreadyClaimed {
        existing: BonusId,
        status: BonusStatus,
    },

    /// Transition not allowed from the current status
    #[error("Invalid transition for bonus {bonus_id}: {from} -> {to}")]
    InvalidTransition {
        bonus_id: BonusId,
        from: BonusStatus,
        to: BonusStatus,
    },

    /// Another terminal transition is already in flight
    #[error("Bonus {bonus_id} already has a pending {pending} transition")]
    TransitionInProgress {
        bonus_id: BonusId,
        pending: TransitionKind,
    },

    /// Wallet call failed after all retries; the bonus is flagged
    #[error(
        "Wallet call for bonus {bonus_id} ({transition}) failed: {reason}; flagged for reconciliation"
    )]
    ReconciliationRequired {
        bonus_id: BonusId,
        transition: TransitionKind,
        reason: String,
    },

    /// Optimistic concurrency retries exhausted
    #[error("Bonus {0} is being modified concurrently, try again")]
    ConcurrentModification(BonusId),

    /// Ledger invariant violation
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Cashback error
    #[error(transparent)]
    Cashback(#[from] CashbackError),

    /// Wallet error
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl BonusError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            BonusError::Store(_) => "Internal server error".to_string(),
            BonusError::Catalog(e) => e.client_message(),
            BonusError::Cashback(e) => e.client_message(),
            BonusError::Wallet(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for lifecycle operations
pub type BonusResult<T> = Result<T, BonusError>;
