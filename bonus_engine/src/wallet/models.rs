//! Wallet data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ledger::{BonusId, PlayerId, TransitionKind};

/// Entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDirection::Debit => write!(f, "debit"),
            EntryDirection::Credit => write!(f, "credit"),
        }
    }
}

/// Why the engine moves money
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalletReason {
    /// Wagering met, bonus balance becomes withdrawable
    BonusConversion { bonus_id: BonusId },
    /// Remaining bonus balance removed on expiry, cancellation or forfeiture
    BonusForfeiture {
        bonus_id: BonusId,
        cause: TransitionKind,
    },
}

impl WalletReason {
    pub fn bonus_id(&self) -> BonusId {
        match self {
            WalletReason::BonusConversion { bonus_id }
            | WalletReason::BonusForfeiture { bonus_id, .. } => *bonus_id,
        }
    }
}

impl fmt::Display for WalletReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletReason::BonusConversion { bonus_id } => {
                write!(f, "bonus {bonus_id} converted")
            }
            WalletReason::BonusForfeiture { bonus_id, cause } => {
                write!(f, "bonus {bonus_id} forfeited ({cause})")
            }
        }
    }
}

/// Confirmation of a wallet movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletReceipt {
    pub entry_id: Uuid,
    pub player_id: PlayerId,
    pub amount: i64,
    pub direction: EntryDirection,
    pub reason: WalletReason,
    pub idempotency_key: String,
    /// Withdrawable balance after the movement
    pub balance_after: i64,
    /// The key had been seen before and nothing moved this time
    pub replayed: bool,
    pub created_at: DateTime<Utc>,
}
