//! Player bonus ledger.
//!
//! Claimed bonuses are the single source of truth for balances and wagering
//! progress. Every balance movement is mirrored by an append-only
//! [`LedgerEntry`] that references its bonus by id.

pub mod errors;
pub mod models;

pub use errors::{LedgerError, LedgerResult};
pub use models::{
    BonusFilter, BonusId, BonusStatus, FreeBetBalance, HistoryAction, HistoryEntry, LedgerEntry,
    LedgerEntryType, PendingTransition, PlayerBonus, PlayerId, TransitionKind, WageringProgress,
};
