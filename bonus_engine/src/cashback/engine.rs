//! Tier selection and cashback computation.

use chrono::{DateTime, Duration, Utc};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;

use super::{
    errors::{CashbackError, CashbackResult},
    models::{
        BPS_DENOMINATOR, CashbackLevel, CashbackPeriod, CashbackQuote, TRAILING_WINDOW_DAYS,
    },
};
use crate::{
    clock::Clock,
    db::{BonusRepository, CashbackLevelRepository},
    ledger::PlayerId,
    wagering::BetSettlement,
};

/// Highest level whose threshold is met, else the lowest level.
///
/// `levels` must be ordered by tier (see [`validate_book`]). A wager equal to
/// a threshold qualifies for that tier.
pub fn select_tier(levels: &[CashbackLevel], trailing_wager: i64) -> Option<&CashbackLevel> {
    levels
        .iter()
        .rev()
        .find(|level| level.min_monthly_wager <= trailing_wager)
        .or_else(|| levels.first())
}

/// Check a level book: unique tiers, strictly increasing thresholds.
///
/// Sorts `levels` by tier in place.
pub fn validate_book(levels: &mut [CashbackLevel]) -> Result<(), String> {
    levels.sort_by_key(|level| level.tier);
    for pair in levels.windows(2) {
        let (lower, upper) = (&pair[0], &pair[1]);
        if lower.tier == upper.tier {
            return Err(format!("tier {} defined twice", lower.tier));
        }
        if upper.min_monthly_wager <= lower.min_monthly_wager {
            return Err(format!(
                "tier {} needs a higher minimum wager than tier {} ({} <= {})",
                upper.tier, lower.tier, upper.min_monthly_wager, lower.min_monthly_wager
            ));
        }
    }
    Ok(())
}

fn validate_level(level: &CashbackLevel) -> Result<(), String> {
    if level.name.trim().is_empty() {
        return Err("name is required".to_string());
    }
    if level.min_monthly_wager < 0 {
        return Err("minimum monthly wager must not be negative".to_string());
    }
    let rates = &level.rates;
    let max_rate = [
        rates.sports,
        rates.casino,
        rates.live_casino,
        rates.virtual_sports,
    ]
    .into_iter()
    .max()
    .unwrap_or(0);
    if i64::from(max_rate) > BPS_DENOMINATOR {
        return Err(format!("rate {max_rate} bps exceeds 100%"));
    }
    let caps = &level.caps;
    if [caps.day, caps.week, caps.month]
        .into_iter()
        .flatten()
        .any(|cap| cap < 0)
    {
        return Err("caps must not be negative".to_string());
    }
    Ok(())
}

/// Compute a quote from already selected inputs.
///
/// Net loss is taken per vertical over non-void bets and floored at zero, so
/// a profitable vertical never offsets a losing one.
pub fn quote_cashback(
    level: &CashbackLevel,
    player_id: PlayerId,
    period: CashbackPeriod,
    window: (DateTime<Utc>, DateTime<Utc>),
    trailing_wager: i64,
    bets: &[BetSettlement],
) -> CashbackQuote {
    let mut net: BTreeMap<_, i64> = BTreeMap::new();
    for bet in bets.iter().filter(|b| !b.is_void()) {
        let loss = net.entry(bet.vertical).or_default();
        *loss = loss.saturating_add(bet.stake.saturating_sub(bet.payout));
    }
    let net_loss_by_vertical: BTreeMap<_, i64> =
        net.into_iter().map(|(v, loss)| (v, loss.max(0))).collect();

    let gross = net_loss_by_vertical
        .iter()
        .map(|(vertical, loss)| {
            loss.saturating_mul(i64::from(level.rates.rate_for(*vertical))) / BPS_DENOMINATOR
        })
        .fold(0i64, i64::saturating_add);

    let cap = level.caps.effective_cap(period);
    let amount = match cap {
        Some(cap) => gross.min(cap),
        None => gross,
    };

    CashbackQuote {
        player_id,
        tier: level.tier,
        period,
        window_start: window.0,
        window_end: window.1,
        trailing_wager,
        net_loss_by_vertical,
        gross,
        cap,
        amount,
    }
}

/// Cashback level book and per-player computations
pub struct CashbackTierEngine {
    levels: Arc<dyn CashbackLevelRepository>,
    wagers: Arc<dyn BonusRepository>,
    clock: Arc<dyn Clock>,
    /// Held across read, validate and write of the level book
    book_lock: Mutex<()>,
}

impl CashbackTierEngine {
    pub fn new(
        levels: Arc<dyn CashbackLevelRepository>,
        wagers: Arc<dyn BonusRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            levels,
            wagers,
            clock,
            book_lock: Mutex::new(()),
        }
    }

    /// All levels ordered by tier
    pub async fn levels(&self) -> CashbackResult<Vec<CashbackLevel>> {
        Ok(self.levels.list_levels().await?)
    }

    pub async fn create_level(&self, level: CashbackLevel) -> CashbackResult<CashbackLevel> {
        validate_level(&level).map_err(CashbackError::Validation)?;

        let _book = self.book_lock.lock().await;
        let mut book = self.levels().await?;
        if book.iter().any(|l| l.tier == level.tier) {
            return Err(CashbackError::DuplicateTier(level.tier));
        }
        book.push(level.clone());
        validate_book(&mut book).map_err(CashbackError::LevelOrderViolation)?;

        self.levels.insert_level(&level).await?;
        log::info!(
            "Created cashback tier {} ({}) from {} monthly wager",
            level.tier,
            level.name,
            level.min_monthly_wager
        );
        Ok(level)
    }

    pub async fn update_level(&self, level: CashbackLevel) -> CashbackResult<CashbackLevel> {
        validate_level(&level).map_err(CashbackError::Validation)?;

        let _book = self.book_lock.lock().await;
        let mut book = self.levels().await?;
        let slot = book
            .iter_mut()
            .find(|l| l.tier == level.tier)
            .ok_or(CashbackError::LevelNotFound(level.tier))?;
        *slot = level.clone();
        validate_book(&mut book).map_err(CashbackError::LevelOrderViolation)?;

        self.levels.save_level(&level).await?;
        log::info!("Updated cashback tier {}", level.tier);
        Ok(level)
    }

    /// Level a player qualifies for with `trailing_wager`.
    pub async fn compute_tier(
        &self,
        player_id: PlayerId,
        trailing_wager: i64,
    ) -> CashbackResult<CashbackLevel> {
        let book = self.levels().await?;
        let level = select_tier(&book, trailing_wager)
            .cloned()
            .ok_or(CashbackError::NoLevelsConfigured)?;
        log::debug!(
            "Player {} with trailing wager {} is tier {}",
            player_id,
            trailing_wager,
            level.tier
        );
        Ok(level)
    }

    /// Non-void stakes over the 30 days ending at `now`.
    pub async fn trailing_wager(
        &self,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> CashbackResult<i64> {
        let from = now - Duration::days(TRAILING_WINDOW_DAYS);
        let bets = self.wagers.wagers_between(player_id, from, now).await?;
        Ok(bets
            .iter()
            .filter(|b| !b.is_void())
            .map(|b| b.stake.max(0))
            .fold(0, i64::saturating_add))
    }

    /// Tier from the player's own trailing wager
    pub async fn current_tier(&self, player_id: PlayerId) -> CashbackResult<CashbackLevel> {
        let wager = self.trailing_wager(player_id, self.clock.now()).await?;
        self.compute_tier(player_id, wager).await
    }

    /// Total net loss (all verticals, floored at zero) over the last `period`.
    pub async fn period_net_loss(
        &self,
        player_id: PlayerId,
        period: CashbackPeriod,
    ) -> CashbackResult<i64> {
        let now = self.clock.now();
        let bets = self
            .wagers
            .wagers_between(player_id, now - period.duration(), now)
            .await?;
        Ok(bets
            .iter()
            .map(BetSettlement::net_loss)
            .fold(0, i64::saturating_add)
            .max(0))
    }

    /// Cashback owed to a player for the period ending now.
    pub async fn compute_cashback(
        &self,
        player_id: PlayerId,
        period: CashbackPeriod,
    ) -> CashbackResult<CashbackQuote> {
        let now = self.clock.now();
        let trailing = self.trailing_wager(player_id, now).await?;
        let level = self.compute_tier(player_id, trailing).await?;

        let window = (now - period.duration(), now);
        let bets = self
            .wagers
            .wagers_between(player_id, window.0, window.1)
            .await?;

        let quote = quote_cashback(&level, player_id, period, window, trailing, &bets);
        log::debug!(
            "Cashback for player {} over {}: gross {} cap {:?} amount {}",
            player_id,
            period,
            quote.gross,
            quote.cap,
            quote.amount
        );
        Ok(quote)
    }
}
