//! Bet settlement events consumed from the betting platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ledger::PlayerId;

/// Product vertical a bet was placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vertical {
    Sports,
    Casino,
    LiveCasino,
    VirtualSports,
}

impl Vertical {
    pub const ALL: [Vertical; 4] = [
        Vertical::Sports,
        Vertical::Casino,
        Vertical::LiveCasino,
        Vertical::VirtualSports,
    ];
}

impl fmt::Display for Vertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertical::Sports => write!(f, "sports"),
            Vertical::Casino => write!(f, "casino"),
            Vertical::LiveCasino => write!(f, "live_casino"),
            Vertical::VirtualSports => write!(f, "virtual_sports"),
        }
    }
}

/// Final outcome of a settled bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetOutcome {
    Won,
    Lost,
    Void,
    CashedOut,
}

/// One selection of a (possibly multi-selection) ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetLeg {
    #[serde(default)]
    pub selection: Option<String>,
    pub odds: f64,
}

/// Settled bet as delivered by the settlement stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetSettlement {
    pub bet_id: String,
    pub player_id: PlayerId,
    /// Stake in minor units
    pub stake: i64,
    pub total_odds: f64,
    #[serde(default)]
    pub legs: Vec<BetLeg>,
    pub outcome: BetOutcome,
    pub vertical: Vertical,
    /// Amount returned to the player (0 for a lost bet)
    #[serde(default)]
    pub payout: i64,
    pub settled_at: DateTime<Utc>,
    /// Bonus whose funds or free bet paid for this ticket, if any
    #[serde(default)]
    pub funded_by: Option<Uuid>,
    /// The ticket was placed with a free bet token of `funded_by`
    #[serde(default)]
    pub free_bet: bool,
    /// Portion of the stake drawn from the bonus balance of `funded_by`
    #[serde(default)]
    pub bonus_funds_used: i64,
}

impl BetSettlement {
    /// Odds used for threshold checks.
    ///
    /// Multi-selection tickets use the product of their leg odds, the same
    /// figure the betting slip shows as potential win multiplier.
    pub fn effective_odds(&self) -> f64 {
        if self.legs.is_empty() {
            self.total_odds
        } else {
            self.legs.iter().map(|leg| leg.odds).product()
        }
    }

    /// Stake minus payout. Negative when the player won.
    pub fn net_loss(&self) -> i64 {
        match self.outcome {
            BetOutcome::Void => 0,
            _ => self.stake.saturating_sub(self.payout),
        }
    }

    pub fn is_void(&self) -> bool {
        self.outcome == BetOutcome::Void
    }
}
