//! Repository trait definitions.
//!
//! The engine only talks to storage through these traits; [`MemoryStore`]
//! and [`PgStore`] are interchangeable behind them.
//!
//! [`MemoryStore`]: super::MemoryStore
//! [`PgStore`]: super::PgStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::StoreResult;
use crate::{
    cashback::CashbackLevel,
    catalog::{BonusTemplate, TemplateFilter, TemplateId},
    ledger::{BonusFilter, BonusId, LedgerEntry, PlayerBonus, PlayerId},
    stats::BonusTotals,
    wagering::BetSettlement,
};

/// Page size used when a filter does not set one
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Hard upper bound on a page
pub const MAX_PAGE_SIZE: u32 = 500;

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }

    /// Cut one page out of an already filtered and ordered list.
    pub fn slice(all: Vec<T>, page: u32, page_size: u32) -> Self {
        let (page, page_size) = normalize_page(page, page_size);
        let total = all.len() as u64;
        let skip = (page as usize - 1).saturating_mul(page_size as usize);
        let items = all.into_iter().skip(skip).take(page_size as usize).collect();
        Self {
            items,
            total,
            page,
            page_size,
        }
    }
}

/// Clamp a 1-based page request into a valid `(page, page_size)`.
pub fn normalize_page(page: u32, page_size: u32) -> (u32, u32) {
    let page = page.max(1);
    let page_size = match page_size {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    (page, page_size)
}

/// Trait for bonus template storage
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Store a new template
    async fn insert_template(&self, template: &BonusTemplate) -> StoreResult<()>;

    /// Find template by ID
    async fn get_template(&self, id: TemplateId) -> StoreResult<Option<BonusTemplate>>;

    /// Replace an existing template
    async fn save_template(&self, template: &BonusTemplate) -> StoreResult<()>;

    /// Replace a template only while no bonus has been claimed from it.
    /// Returns false, leaving the stored template untouched, once one has.
    async fn save_unclaimed_template(&self, template: &BonusTemplate) -> StoreResult<bool>;

    /// Remove a template. Returns false if it did not exist.
    async fn delete_template(&self, id: TemplateId) -> StoreResult<bool>;

    /// Filtered, paginated listing, newest first
    async fn list_templates(&self, filter: &TemplateFilter) -> StoreResult<Page<BonusTemplate>>;
}

/// Trait for player bonus, ledger entry and settled wager storage
#[async_trait]
pub trait BonusRepository: Send + Sync {
    /// Persist a freshly claimed bonus together with its ledger entries.
    /// Either everything is stored or nothing is.
    async fn insert_claim(&self, bonus: &PlayerBonus, entries: &[LedgerEntry]) -> StoreResult<()>;

    /// Find bonus by ID
    async fn get_bonus(&self, id: BonusId) -> StoreResult<Option<PlayerBonus>>;

    /// Compare-and-swap on `bonus.version`; appends `entries` in the same
    /// atomic unit and returns the new version.
    async fn update_bonus(&self, bonus: &PlayerBonus, entries: &[LedgerEntry])
    -> StoreResult<i64>;

    /// Filtered, paginated listing, newest claim first
    async fn list_bonuses(&self, filter: &BonusFilter) -> StoreResult<Page<PlayerBonus>>;

    /// Bonus counts and amounts grouped by type, status and reconciliation flag
    async fn bonus_totals(&self) -> StoreResult<Vec<BonusTotals>>;

    /// Player bonuses in `active` or `wagering` status
    async fn open_bonuses_for_player(&self, player_id: PlayerId) -> StoreResult<Vec<PlayerBonus>>;

    /// Non-terminal bonuses of a player from one template
    async fn non_terminal_for_template(
        &self,
        player_id: PlayerId,
        template_id: TemplateId,
    ) -> StoreResult<Vec<PlayerBonus>>;

    /// Open bonuses past their wagering deadline with no transition in flight
    async fn due_for_expiry(&self, now: DateTime<Utc>, limit: usize)
    -> StoreResult<Vec<PlayerBonus>>;

    /// Bonuses with a reserved terminal transition that has not committed
    async fn pending_reconciliation(&self, limit: usize) -> StoreResult<Vec<PlayerBonus>>;

    /// Number of bonuses ever claimed from a template
    async fn count_bonuses_for_template(&self, template_id: TemplateId) -> StoreResult<u64>;

    /// Ledger entries of a bonus in insertion order
    async fn ledger_entries(&self, bonus_id: BonusId) -> StoreResult<Vec<LedgerEntry>>;

    /// Record a settled wager. Returns false if this player already
    /// recorded the bet id.
    async fn record_wager(&self, bet: &BetSettlement) -> StoreResult<bool>;

    /// Settled wagers of a player with `from <= settled_at <= to`
    async fn wagers_between(
        &self,
        player_id: PlayerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BetSettlement>>;
}

/// Trait for cashback level storage
#[async_trait]
pub trait CashbackLevelRepository: Send + Sync {
    /// All levels ordered by tier
    async fn list_levels(&self) -> StoreResult<Vec<CashbackLevel>>;

    /// Store a new level
    async fn insert_level(&self, level: &CashbackLevel) -> StoreResult<()>;

    /// Replace an existing level (matched by tier)
    async fn save_level(&self, level: &CashbackLevel) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_page() {
        assert_eq!(normalize_page(0, 0), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(normalize_page(3, 10_000), (3, MAX_PAGE_SIZE));
    }

    #[test]
    fn test_slice_second_page() {
        let page = Page::slice((1..=12).collect::<Vec<_>>(), 2, 5);
        assert_eq!(page.items, vec![6, 7, 8, 9, 10]);
        assert_eq!(page.total, 12);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn test_slice_past_end_is_empty() {
        let page = Page::slice(vec![1, 2, 3], 9, 5);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }
}
