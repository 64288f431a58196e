//! Cashback level data models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::wagering::Vertical;

/// Rolling window used to qualify for a tier
pub const TRAILING_WINDOW_DAYS: i64 = 30;

/// Basis points in 100%
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Cashback accounting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashbackPeriod {
    Day,
    Week,
    Month,
}

impl CashbackPeriod {
    pub fn duration(self) -> Duration {
        match self {
            CashbackPeriod::Day => Duration::days(1),
            CashbackPeriod::Week => Duration::days(7),
            CashbackPeriod::Month => Duration::days(TRAILING_WINDOW_DAYS),
        }
    }
}

impl fmt::Display for CashbackPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CashbackPeriod::Day => write!(f, "day"),
            CashbackPeriod::Week => write!(f, "week"),
            CashbackPeriod::Month => write!(f, "month"),
        }
    }
}

impl FromStr for CashbackPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(CashbackPeriod::Day),
            "week" => Ok(CashbackPeriod::Week),
            "month" => Ok(CashbackPeriod::Month),
            other => Err(format!("unknown cashback period '{other}'")),
        }
    }
}

/// Per-vertical cashback rates in basis points
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerticalRates {
    pub sports: u32,
    pub casino: u32,
    pub live_casino: u32,
    pub virtual_sports: u32,
}

impl VerticalRates {
    pub fn rate_for(&self, vertical: Vertical) -> u32 {
        match vertical {
            Vertical::Sports => self.sports,
            Vertical::Casino => self.casino,
            Vertical::LiveCasino => self.live_casino,
            Vertical::VirtualSports => self.virtual_sports,
        }
    }
}

/// Maximum cashback per period. `None` means uncapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCaps {
    #[serde(default)]
    pub day: Option<i64>,
    #[serde(default)]
    pub week: Option<i64>,
    #[serde(default)]
    pub month: Option<i64>,
}

impl PeriodCaps {
    /// Tightest cap that binds a payout for `period`.
    ///
    /// A day's cashback can never exceed the week or month cap either, so the
    /// requested period's cap is combined with every longer period's cap.
    pub fn effective_cap(&self, period: CashbackPeriod) -> Option<i64> {
        let applicable: &[Option<i64>] = match period {
            CashbackPeriod::Day => &[self.day, self.week, self.month],
            CashbackPeriod::Week => &[self.week, self.month],
            CashbackPeriod::Month => &[self.month],
        };
        applicable.iter().flatten().copied().min()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelBenefits {
    #[serde(default)]
    pub priority_support: bool,
    #[serde(default)]
    pub personal_manager: bool,
    #[serde(default)]
    pub exclusive_promotions: bool,
    #[serde(default)]
    pub faster_withdrawals: bool,
}

/// Cashback tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackLevel {
    pub tier: u32,
    pub name: String,
    /// Trailing 30-day wager needed to reach this tier
    pub min_monthly_wager: i64,
    pub rates: VerticalRates,
    #[serde(default)]
    pub caps: PeriodCaps,
    #[serde(default)]
    pub benefits: LevelBenefits,
}

/// Computed cashback for one player and period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackQuote {
    pub player_id: i64,
    pub tier: u32,
    pub period: CashbackPeriod,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub trailing_wager: i64,
    pub net_loss_by_vertical: BTreeMap<Vertical, i64>,
    /// Cashback before caps
    pub gross: i64,
    pub cap: Option<i64>,
    pub amount: i64,
}
