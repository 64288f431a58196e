//! In-memory repository backend.
//!
//! One `RwLock` guards every table so that multi-record writes (a claim and
//! its credit entry, a bonus update and its entries) are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    errors::{StoreError, StoreResult},
    repository::{BonusRepository, CashbackLevelRepository, Page, TemplateRepository},
};
use crate::{
    cashback::CashbackLevel,
    catalog::{BonusTemplate, PayoutRule, TemplateFilter, TemplateId},
    ledger::{BonusFilter, BonusId, LedgerEntry, PlayerBonus, PlayerId},
    stats::BonusTotals,
    wagering::BetSettlement,
};

#[derive(Default)]
struct Tables {
    templates: HashMap<TemplateId, BonusTemplate>,
    bonuses: HashMap<BonusId, PlayerBonus>,
    entries: Vec<LedgerEntry>,
    wagers: HashMap<(PlayerId, String), BetSettlement>,
    levels: BTreeMap<u32, CashbackLevel>,
}

/// Process-local store implementing every repository trait
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn insert_template(&self, template: &BonusTemplate) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.templates.contains_key(&template.id) {
            return Err(StoreError::Duplicate(format!("template {}", template.id)));
        }
        tables.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: TemplateId) -> StoreResult<Option<BonusTemplate>> {
        Ok(self.tables.read().await.templates.get(&id).cloned())
    }

    async fn save_template(&self, template: &BonusTemplate) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .templates
            .get_mut(&template.id)
            .ok_or(StoreError::TemplateNotFound(template.id))?;
        *slot = template.clone();
        Ok(())
    }

    async fn save_unclaimed_template(&self, template: &BonusTemplate) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables
            .bonuses
            .values()
            .any(|b| b.template_id == template.id)
        {
            return Ok(false);
        }
        let slot = tables
            .templates
            .get_mut(&template.id)
            .ok_or(StoreError::TemplateNotFound(template.id))?;
        *slot = template.clone();
        Ok(true)
    }

    async fn delete_template(&self, id: TemplateId) -> StoreResult<bool> {
        Ok(self.tables.write().await.templates.remove(&id).is_some())
    }

    async fn list_templates(&self, filter: &TemplateFilter) -> StoreResult<Page<BonusTemplate>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<BonusTemplate> = tables
            .templates
            .values()
            .filter(|t| filter.status.is_none_or(|s| s == t.status))
            .filter(|t| filter.bonus_type.is_none_or(|k| k == t.kind.bonus_type()))
            .filter(|t| filter.category.is_none_or(|c| c == t.category))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(Page::slice(matching, filter.page, filter.page_size))
    }
}

#[async_trait]
impl BonusRepository for MemoryStore {
    async fn insert_claim(&self, bonus: &PlayerBonus, entries: &[LedgerEntry]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.bonuses.contains_key(&bonus.id) {
            return Err(StoreError::Duplicate(format!("bonus {}", bonus.id)));
        }
        if !tables.templates.contains_key(&bonus.template_id) {
            return Err(StoreError::TemplateNotFound(bonus.template_id));
        }
        tables.bonuses.insert(bonus.id, bonus.clone());
        tables.entries.extend_from_slice(entries);
        Ok(())
    }

    async fn get_bonus(&self, id: BonusId) -> StoreResult<Option<PlayerBonus>> {
        Ok(self.tables.read().await.bonuses.get(&id).cloned())
    }

    async fn update_bonus(
        &self,
        bonus: &PlayerBonus,
        entries: &[LedgerEntry],
    ) -> StoreResult<i64> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .bonuses
            .get_mut(&bonus.id)
            .ok_or(StoreError::BonusNotFound(bonus.id))?;
        if stored.version != bonus.version {
            return Err(StoreError::VersionConflict {
                bonus_id: bonus.id,
                expected: bonus.version,
                actual: stored.version,
            });
        }
        let mut next = bonus.clone();
        next.version += 1;
        let version = next.version;
        *stored = next;
        tables.entries.extend_from_slice(entries);
        Ok(version)
    }

    async fn list_bonuses(&self, filter: &BonusFilter) -> StoreResult<Page<PlayerBonus>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<PlayerBonus> = tables
            .bonuses
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.claimed_at.cmp(&a.claimed_at).then(a.id.cmp(&b.id)));
        Ok(Page::slice(matching, filter.page, filter.page_size))
    }

    async fn bonus_totals(&self) -> StoreResult<Vec<BonusTotals>> {
        Ok(BonusTotals::group(self.tables.read().await.bonuses.values()))
    }

    async fn open_bonuses_for_player(&self, player_id: PlayerId) -> StoreResult<Vec<PlayerBonus>> {
        let tables = self.tables.read().await;
        let mut open: Vec<PlayerBonus> = tables
            .bonuses
            .values()
            .filter(|b| b.player_id == player_id && b.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|b| b.claimed_at);
        Ok(open)
    }

    async fn non_terminal_for_template(
        &self,
        player_id: PlayerId,
        template_id: TemplateId,
    ) -> StoreResult<Vec<PlayerBonus>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bonuses
            .values()
            .filter(|b| {
                b.player_id == player_id && b.template_id == template_id && !b.status.is_terminal()
            })
            .cloned()
            .collect())
    }

    async fn due_for_expiry(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<PlayerBonus>> {
        let tables = self.tables.read().await;
        let mut due: Vec<PlayerBonus> = tables
            .bonuses
            .values()
            .filter(|b| b.status.is_open() && b.wager_deadline < now)
            .filter(|b| b.pending_transition.is_none())
            .cloned()
            .collect();
        due.sort_by_key(|b| b.wager_deadline);
        due.truncate(limit);
        Ok(due)
    }

    async fn pending_reconciliation(&self, limit: usize) -> StoreResult<Vec<PlayerBonus>> {
        let tables = self.tables.read().await;
        let mut pending: Vec<PlayerBonus> = tables
            .bonuses
            .values()
            .filter(|b| b.pending_transition.is_some() && !b.status.is_terminal())
            .cloned()
            .collect();
        pending.sort_by_key(|b| b.pending_transition.as_ref().map(|p| p.requested_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn count_bonuses_for_template(&self, template_id: TemplateId) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .bonuses
            .values()
            .filter(|b| b.template_id == template_id)
            .count() as u64)
    }

    async fn ledger_entries(&self, bonus_id: BonusId) -> StoreResult<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .iter()
            .filter(|e| e.bonus_id == bonus_id)
            .cloned()
            .collect())
    }

    async fn record_wager(&self, bet: &BetSettlement) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let key = (bet.player_id, bet.bet_id.clone());
        if tables.wagers.contains_key(&key) {
            return Ok(false);
        }
        tables.wagers.insert(key, bet.clone());
        Ok(true)
    }

    async fn wagers_between(
        &self,
        player_id: PlayerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BetSettlement>> {
        let tables = self.tables.read().await;
        let mut wagers: Vec<BetSettlement> = tables
            .wagers
            .values()
            .filter(|w| w.player_id == player_id && w.settled_at >= from && w.settled_at <= to)
            .cloned()
            .collect();
        wagers.sort_by_key(|w| w.settled_at);
        Ok(wagers)
    }
}

#[async_trait]
impl CashbackLevelRepository for MemoryStore {
    async fn list_levels(&self) -> StoreResult<Vec<CashbackLevel>> {
        Ok(self.tables.read().await.levels.values().cloned().collect())
    }

    async fn insert_level(&self, level: &CashbackLevel) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.levels.contains_key(&level.tier) {
            return Err(StoreError::Duplicate(format!("cashback tier {}", level.tier)));
        }
        tables.levels.insert(level.tier, level.clone());
        Ok(())
    }

    async fn save_level(&self, level: &CashbackLevel) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .levels
            .get_mut(&level.tier)
            .ok_or(StoreError::LevelNotFound(level.tier))?;
        *slot = level.clone();
        Ok(())
    }
}
