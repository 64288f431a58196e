//! Ledger error types.

use thiserror::Error;
use uuid::Uuid;

use super::models::BonusStatus;

/// Violations of the player bonus invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Terminal bonuses are immutable
    #[error("Bonus {bonus_id} is {status} and can no longer change")]
    Terminal { bonus_id: Uuid, status: BonusStatus },

    /// Transition not allowed by the lifecycle
    #[error("Invalid transition for bonus {bonus_id}: {from} -> {to}")]
    InvalidTransition {
        bonus_id: Uuid,
        from: BonusStatus,
        to: BonusStatus,
    },

    /// No free bets left on the bonus
    #[error("Bonus {0} has no free bets remaining")]
    NoFreeBetsRemaining(Uuid),

    /// Free bets can't be used after the expiry instant
    #[error("Free bets of bonus {0} have expired")]
    FreeBetsExpired(Uuid),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
