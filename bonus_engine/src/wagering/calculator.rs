//! Pure wagering credit computation.
//!
//! Nothing in here fails: a malformed bet is logged and contributes zero so
//! it can never block the rest of a settlement.

use super::models::{BetOutcome, BetSettlement};
use crate::catalog::{BonusKind, ComboBoost, TemplateSnapshot};

/// Wagering credit a settled bet earns towards a bonus with `terms`.
pub fn contribution(bet: &BetSettlement, terms: &TemplateSnapshot) -> i64 {
    if let Err(reason) = check_well_formed(bet) {
        log::warn!("Ignoring malformed bet {}: {}", bet.bet_id, reason);
        return 0;
    }

    if bet.is_void() {
        log::debug!("Bet {} is void, no wagering credit", bet.bet_id);
        return 0;
    }

    if !terms.category.covers(bet.vertical) {
        log::debug!(
            "Bet {} in {} does not count for a {} bonus",
            bet.bet_id,
            bet.vertical,
            terms.category
        );
        return 0;
    }

    let odds = bet.effective_odds();
    if odds < terms.wagering.min_odds {
        log::debug!(
            "Bet {} odds {:.3} below minimum {:.3}",
            bet.bet_id,
            odds,
            terms.wagering.min_odds
        );
        return 0;
    }

    bet.stake
}

fn check_well_formed(bet: &BetSettlement) -> Result<(), String> {
    if bet.stake <= 0 {
        return Err(format!("non-positive stake {}", bet.stake));
    }
    if bet.payout < 0 {
        return Err(format!("negative payout {}", bet.payout));
    }
    if !valid_odds(bet.total_odds) && bet.legs.is_empty() {
        return Err(format!("invalid odds {}", bet.total_odds));
    }
    if let Some(leg) = bet.legs.iter().find(|leg| !valid_odds(leg.odds)) {
        return Err(format!("invalid leg odds {}", leg.odds));
    }
    if !valid_odds(bet.effective_odds()) {
        return Err("effective odds overflow".to_string());
    }
    Ok(())
}

fn valid_odds(odds: f64) -> bool {
    odds.is_finite() && odds >= 1.0
}

/// Boost percentage a combo ticket with `legs` selections earns.
pub fn combo_boost_percent(legs: usize, terms: &ComboBoost) -> u32 {
    let legs = u32::try_from(legs).unwrap_or(u32::MAX);
    if legs < terms.min_legs {
        return 0;
    }
    let qualifying = legs - terms.min_legs + 1;
    qualifying
        .saturating_mul(terms.boost_per_leg_pct)
        .min(terms.max_boost_pct)
}

/// Boost owed on a won combo ticket, before the bonus budget caps it.
///
/// Only winning multi-leg tickets that also pass the bonus wagering terms
/// are boosted; the boost applies to the winnings (payout minus stake).
pub fn combo_boost_amount(bet: &BetSettlement, terms: &TemplateSnapshot) -> i64 {
    let BonusKind::ComboBoost(combo) = &terms.kind else {
        return 0;
    };
    if bet.outcome != BetOutcome::Won || contribution(bet, terms) == 0 {
        return 0;
    }
    let pct = combo_boost_percent(bet.legs.len(), combo);
    let winnings = (bet.payout - bet.stake).max(0);
    winnings.saturating_mul(i64::from(pct)) / 100
}
