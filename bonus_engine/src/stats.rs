//! Claim and conversion statistics computed from the ledger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    catalog::BonusType,
    ledger::{BonusStatus, PlayerBonus},
};

/// Per bonus type breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub bonus_type: BonusType,
    pub claimed: u64,
    pub completed: u64,
    /// `completed / claimed`, 0 when nothing was claimed
    pub conversion_rate: f64,
}

/// Bonuses sharing a type, status and reconciliation flag, summed.
///
/// Storage backends aggregate into these rows so statistics never need
/// every bonus in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTotals {
    pub bonus_type: BonusType,
    pub status: BonusStatus,
    pub awaiting_reconciliation: bool,
    pub count: u64,
    pub granted: i64,
    pub settled: i64,
    pub remaining: i64,
}

impl BonusTotals {
    /// Group already loaded bonuses.
    pub fn group<'a>(bonuses: impl IntoIterator<Item = &'a PlayerBonus>) -> Vec<Self> {
        let mut groups: BTreeMap<(BonusType, BonusStatus, bool), BonusTotals> = BTreeMap::new();
        for bonus in bonuses {
            let key = (
                bonus.bonus_type(),
                bonus.status,
                bonus.needs_reconciliation(),
            );
            let row = groups.entry(key).or_insert_with(|| BonusTotals {
                bonus_type: key.0,
                status: key.1,
                awaiting_reconciliation: key.2,
                count: 0,
                granted: 0,
                settled: 0,
                remaining: 0,
            });
            row.count += 1;
            row.granted = row.granted.saturating_add(bonus.bonus_amount);
            row.settled = row.settled.saturating_add(bonus.settled_amount);
            row.remaining = row.remaining.saturating_add(bonus.bonus_remaining);
        }
        groups.into_values().collect()
    }
}

/// Aggregate statistics over every player bonus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BonusStats {
    pub total_claimed: u64,
    pub active: u64,
    pub wagering: u64,
    pub completed: u64,
    pub expired: u64,
    pub cancelled: u64,
    pub forfeited: u64,
    pub awaiting_reconciliation: u64,
    /// Sum of granted bonus amounts
    pub total_granted: i64,
    /// Sum moved to withdrawable balance on completion
    pub total_converted: i64,
    /// Sum removed by expiry, cancellation or forfeiture
    pub total_forfeited: i64,
    /// Bonus balance still held by open bonuses
    pub outstanding: i64,
    pub by_type: Vec<TypeStats>,
}

impl BonusStats {
    pub fn compute(bonuses: &[PlayerBonus]) -> Self {
        Self::from_totals(&BonusTotals::group(bonuses))
    }

    pub fn from_totals(rows: &[BonusTotals]) -> Self {
        let mut stats = BonusStats::default();
        let mut per_type: BTreeMap<BonusType, (u64, u64)> = BonusType::ALL
            .into_iter()
            .map(|t| (t, (0, 0)))
            .collect();

        for row in rows {
            stats.total_claimed += row.count;
            stats.total_granted = stats.total_granted.saturating_add(row.granted);

            let counts = per_type.entry(row.bonus_type).or_default();
            counts.0 += row.count;

            match row.status {
                BonusStatus::Pending => {}
                BonusStatus::Active => stats.active += row.count,
                BonusStatus::Wagering => stats.wagering += row.count,
                BonusStatus::Completed => {
                    stats.completed += row.count;
                    stats.total_converted = stats.total_converted.saturating_add(row.settled);
                    counts.1 += row.count;
                }
                BonusStatus::Expired => stats.expired += row.count,
                BonusStatus::Cancelled => stats.cancelled += row.count,
                BonusStatus::Forfeited => stats.forfeited += row.count,
            }

            if matches!(
                row.status,
                BonusStatus::Expired | BonusStatus::Cancelled | BonusStatus::Forfeited
            ) {
                stats.total_forfeited = stats.total_forfeited.saturating_add(row.settled);
            }
            if row.status.is_open() {
                stats.outstanding = stats.outstanding.saturating_add(row.remaining);
            }
            if row.awaiting_reconciliation {
                stats.awaiting_reconciliation += row.count;
            }
        }

        stats.by_type = per_type
            .into_iter()
            .map(|(bonus_type, (claimed, completed))| TypeStats {
                bonus_type,
                claimed,
                completed,
                conversion_rate: if claimed == 0 {
                    0.0
                } else {
                    completed as f64 / claimed as f64
                },
            })
            .collect();

        stats
    }
}
