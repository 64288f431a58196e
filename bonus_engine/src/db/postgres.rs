//! PostgreSQL repository backend.
//!
//! Every aggregate is stored as a JSONB document next to the handful of
//! columns the engine filters on. Schema lives in
//! `migrations/0001_bonus_engine.sql`.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use std::sync::Arc;

use super::{
    errors::{StoreError, StoreResult},
    repository::{
        BonusRepository, CashbackLevelRepository, Page, TemplateRepository, normalize_page,
    },
    timeouts::{with_default_timeout, with_transaction_timeout},
};
use crate::{
    cashback::CashbackLevel,
    catalog::{BonusTemplate, PayoutRule, TemplateFilter, TemplateId},
    ledger::{BonusFilter, BonusId, LedgerEntry, PlayerBonus, PlayerId},
    stats::BonusTotals,
    wagering::BetSettlement,
};

/// PostgreSQL implementation of every repository trait
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema. Statements are idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let schema = include_str!("../../migrations/0001_bonus_engine.sql");
        sqlx::raw_sql(schema).execute(self.pool.as_ref()).await?;
        Ok(())
    }
}

fn template_from_row(row: &PgRow) -> StoreResult<BonusTemplate> {
    let Json(template): Json<BonusTemplate> = row.try_get("data")?;
    Ok(template)
}

fn bonus_from_row(row: &PgRow) -> StoreResult<PlayerBonus> {
    let Json(mut bonus): Json<PlayerBonus> = row.try_get("data")?;
    bonus.version = row.try_get("version")?;
    Ok(bonus)
}

fn count_from_row(row: &PgRow) -> StoreResult<u64> {
    let count: i64 = row.try_get("count")?;
    Ok(u64::try_from(count).unwrap_or(0))
}

#[async_trait]
impl TemplateRepository for PgStore {
    async fn insert_template(&self, template: &BonusTemplate) -> StoreResult<()> {
        with_default_timeout(async {
            sqlx::query(
                r#"
                INSERT INTO bonus_templates
                    (id, name, bonus_type, category, status, data, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(template.id)
            .bind(&template.name)
            .bind(template.kind.bonus_type().to_string())
            .bind(template.category.to_string())
            .bind(template.status.to_string())
            .bind(Json(template))
            .bind(template.created_at)
            .bind(template.updated_at)
            .execute(self.pool.as_ref())
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_template(&self, id: TemplateId) -> StoreResult<Option<BonusTemplate>> {
        with_default_timeout(async {
            let row = sqlx::query("SELECT data FROM bonus_templates WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref())
                .await?;
            row.as_ref().map(template_from_row).transpose()
        })
        .await
    }

    async fn save_template(&self, template: &BonusTemplate) -> StoreResult<()> {
        with_default_timeout(async {
            let result = sqlx::query(
                r#"
                UPDATE bonus_templates
                SET name = $2, bonus_type = $3, category = $4, status = $5, data = $6,
                    updated_at = $7
                WHERE id = $1
                "#,
            )
            .bind(template.id)
            .bind(&template.name)
            .bind(template.kind.bonus_type().to_string())
            .bind(template.category.to_string())
            .bind(template.status.to_string())
            .bind(Json(template))
            .bind(template.updated_at)
            .execute(self.pool.as_ref())
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::TemplateNotFound(template.id));
            }
            Ok(())
        })
        .await
    }

    async fn save_unclaimed_template(&self, template: &BonusTemplate) -> StoreResult<bool> {
        with_transaction_timeout(async {
            let mut tx = self.pool.begin().await?;

            // blocks claims on this template until the transaction ends
            let locked = sqlx::query("SELECT id FROM bonus_templates WHERE id = $1 FOR UPDATE")
                .bind(template.id)
                .fetch_optional(&mut *tx)
                .await?;
            if locked.is_none() {
                return Err(StoreError::TemplateNotFound(template.id));
            }

            let claimed = sqlx::query(
                "SELECT EXISTS (SELECT 1 FROM player_bonuses WHERE template_id = $1) AS claimed",
            )
            .bind(template.id)
            .fetch_one(&mut *tx)
            .await?;
            if claimed.try_get::<bool, _>("claimed")? {
                return Ok(false);
            }

            sqlx::query(
                r#"
                UPDATE bonus_templates
                SET name = $2, bonus_type = $3, category = $4, status = $5, data = $6,
                    updated_at = $7
                WHERE id = $1
                "#,
            )
            .bind(template.id)
            .bind(&template.name)
            .bind(template.kind.bonus_type().to_string())
            .bind(template.category.to_string())
            .bind(template.status.to_string())
            .bind(Json(template))
            .bind(template.updated_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(true)
        })
        .await
    }

    async fn delete_template(&self, id: TemplateId) -> StoreResult<bool> {
        with_default_timeout(async {
            let result = sqlx::query("DELETE FROM bonus_templates WHERE id = $1")
                .bind(id)
                .execute(self.pool.as_ref())
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn list_templates(&self, filter: &TemplateFilter) -> StoreResult<Page<BonusTemplate>> {
        let (page, page_size) = normalize_page(filter.page, filter.page_size);
        let status = filter.status.map(|s| s.to_string());
        let bonus_type = filter.bonus_type.map(|t| t.to_string());
        let category = filter.category.map(|c| c.to_string());

        with_default_timeout(async {
            let total = sqlx::query(
                r#"
                SELECT COUNT(*) AS count FROM bonus_templates
                WHERE ($1::TEXT IS NULL OR status = $1)
                  AND ($2::TEXT IS NULL OR bonus_type = $2)
                  AND ($3::TEXT IS NULL OR category = $3)
                "#,
            )
            .bind(&status)
            .bind(&bonus_type)
            .bind(&category)
            .fetch_one(self.pool.as_ref())
            .await?;

            let rows = sqlx::query(
                r#"
                SELECT data FROM bonus_templates
                WHERE ($1::TEXT IS NULL OR status = $1)
                  AND ($2::TEXT IS NULL OR bonus_type = $2)
                  AND ($3::TEXT IS NULL OR category = $3)
                ORDER BY created_at DESC, id
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(&status)
            .bind(&bonus_type)
            .bind(&category)
            .bind(i64::from(page_size))
            .bind(i64::from(page - 1) * i64::from(page_size))
            .fetch_all(self.pool.as_ref())
            .await?;

            Ok(Page {
                items: rows.iter().map(template_from_row).collect::<StoreResult<_>>()?,
                total: count_from_row(&total)?,
                page,
                page_size,
            })
        })
        .await
    }
}

#[async_trait]
impl BonusRepository for PgStore {
    async fn insert_claim(&self, bonus: &PlayerBonus, entries: &[LedgerEntry]) -> StoreResult<()> {
        with_transaction_timeout(async {
            let mut tx = self.pool.begin().await?;

            let template = sqlx::query("SELECT id FROM bonus_templates WHERE id = $1 FOR SHARE")
                .bind(bonus.template_id)
                .fetch_optional(&mut *tx)
                .await?;
            if template.is_none() {
                return Err(StoreError::TemplateNotFound(bonus.template_id));
            }

            sqlx::query(
                r#"
                INSERT INTO player_bonuses
                    (id, player_id, template_id, bonus_type, status, claimed_at,
                     wager_deadline, has_pending_transition, version, data)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(bonus.id)
            .bind(bonus.player_id)
            .bind(bonus.template_id)
            .bind(bonus.bonus_type().to_string())
            .bind(bonus.status.to_string())
            .bind(bonus.claimed_at)
            .bind(bonus.wager_deadline)
            .bind(bonus.pending_transition.is_some())
            .bind(bonus.version)
            .bind(Json(bonus))
            .execute(&mut *tx)
            .await?;

            for entry in entries {
                insert_entry(&mut tx, entry).await?;
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn get_bonus(&self, id: BonusId) -> StoreResult<Option<PlayerBonus>> {
        with_default_timeout(async {
            let row = sqlx::query("SELECT data, version FROM player_bonuses WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref())
                .await?;
            row.as_ref().map(bonus_from_row).transpose()
        })
        .await
    }

    async fn update_bonus(
        &self,
        bonus: &PlayerBonus,
        entries: &[LedgerEntry],
    ) -> StoreResult<i64> {
        with_transaction_timeout(async {
            let mut tx = self.pool.begin().await?;

            let mut next = bonus.clone();
            next.version = bonus.version + 1;

            let updated = sqlx::query(
                r#"
                UPDATE player_bonuses
                SET status = $3, has_pending_transition = $4, version = $5, data = $6
                WHERE id = $1 AND version = $2
                RETURNING version
                "#,
            )
            .bind(bonus.id)
            .bind(bonus.version)
            .bind(next.status.to_string())
            .bind(next.pending_transition.is_some())
            .bind(next.version)
            .bind(Json(&next))
            .fetch_optional(&mut *tx)
            .await?;

            if updated.is_none() {
                let current = sqlx::query("SELECT version FROM player_bonuses WHERE id = $1")
                    .bind(bonus.id)
                    .fetch_optional(&mut *tx)
                    .await?;
                return match current {
                    Some(row) => Err(StoreError::VersionConflict {
                        bonus_id: bonus.id,
                        expected: bonus.version,
                        actual: row.try_get("version")?,
                    }),
                    None => Err(StoreError::BonusNotFound(bonus.id)),
                };
            }

            for entry in entries {
                insert_entry(&mut tx, entry).await?;
            }

            tx.commit().await?;
            Ok(next.version)
        })
        .await
    }

    async fn list_bonuses(&self, filter: &BonusFilter) -> StoreResult<Page<PlayerBonus>> {
        let (page, page_size) = normalize_page(filter.page, filter.page_size);
        let status = filter.status.map(|s| s.to_string());
        let bonus_type = filter.bonus_type.map(|t| t.to_string());

        with_default_timeout(async {
            let total = sqlx::query(
                r#"
                SELECT COUNT(*) AS count FROM player_bonuses
                WHERE ($1::BIGINT IS NULL OR player_id = $1)
                  AND ($2::TEXT IS NULL OR status = $2)
                  AND ($3::TEXT IS NULL OR bonus_type = $3)
                "#,
            )
            .bind(filter.player_id)
            .bind(&status)
            .bind(&bonus_type)
            .fetch_one(self.pool.as_ref())
            .await?;

            let rows = sqlx::query(
                r#"
                SELECT data, version FROM player_bonuses
                WHERE ($1::BIGINT IS NULL OR player_id = $1)
                  AND ($2::TEXT IS NULL OR status = $2)
                  AND ($3::TEXT IS NULL OR bonus_type = $3)
                ORDER BY claimed_at DESC, id
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(filter.player_id)
            .bind(&status)
            .bind(&bonus_type)
            .bind(i64::from(page_size))
            .bind(i64::from(page - 1) * i64::from(page_size))
            .fetch_all(self.pool.as_ref())
            .await?;

            Ok(Page {
                items: rows.iter().map(bonus_from_row).collect::<StoreResult<_>>()?,
                total: count_from_row(&total)?,
                page,
                page_size,
            })
        })
        .await
    }

    async fn bonus_totals(&self) -> StoreResult<Vec<BonusTotals>> {
        with_default_timeout(async {
            let rows = sqlx::query(
                r#"
                SELECT bonus_type,
                       status,
                       COALESCE((data->'pending_transition'->>'attempts')::INTEGER, 0) > 0
                           AS awaiting_reconciliation,
                       COUNT(*) AS count,
                       COALESCE(SUM((data->>'bonus_amount')::BIGINT), 0)::BIGINT AS granted,
                       COALESCE(SUM((data->>'settled_amount')::BIGINT), 0)::BIGINT AS settled,
                       COALESCE(SUM((data->>'bonus_remaining')::BIGINT), 0)::BIGINT AS remaining
                FROM player_bonuses
                GROUP BY 1, 2, 3
                "#,
            )
            .fetch_all(self.pool.as_ref())
            .await?;

            rows.iter()
                .map(|row| {
                    let bonus_type: String = row.try_get("bonus_type")?;
                    let status: String = row.try_get("status")?;
                    Ok(BonusTotals {
                        bonus_type: bonus_type.parse().map_err(StoreError::Corrupt)?,
                        status: status.parse().map_err(StoreError::Corrupt)?,
                        awaiting_reconciliation: row.try_get("awaiting_reconciliation")?,
                        count: count_from_row(row)?,
                        granted: row.try_get("granted")?,
                        settled: row.try_get("settled")?,
                        remaining: row.try_get("remaining")?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn open_bonuses_for_player(&self, player_id: PlayerId) -> StoreResult<Vec<PlayerBonus>> {
        with_default_timeout(async {
            let rows = sqlx::query(
                r#"
                SELECT data, version FROM player_bonuses
                WHERE player_id = $1 AND status IN ('active', 'wagering')
                ORDER BY claimed_at
                "#,
            )
            .bind(player_id)
            .fetch_all(self.pool.as_ref())
            .await?;
            rows.iter().map(bonus_from_row).collect()
        })
        .await
    }

    async fn non_terminal_for_template(
        &self,
        player_id: PlayerId,
        template_id: TemplateId,
    ) -> StoreResult<Vec<PlayerBonus>> {
        with_default_timeout(async {
            let rows = sqlx::query(
                r#"
                SELECT data, version FROM player_bonuses
                WHERE player_id = $1 AND template_id = $2
                  AND status IN ('pending', 'active', 'wagering')
                "#,
            )
            .bind(player_id)
            .bind(template_id)
            .fetch_all(self.pool.as_ref())
            .await?;
            rows.iter().map(bonus_from_row).collect()
        })
        .await
    }

    async fn due_for_expiry(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<PlayerBonus>> {
        with_default_timeout(async {
            let rows = sqlx::query(
                r#"
                SELECT data, version FROM player_bonuses
                WHERE status IN ('active', 'wagering')
                  AND wager_deadline < $1
                  AND NOT has_pending_transition
                ORDER BY wager_deadline
                LIMIT $2
                "#,
            )
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.pool.as_ref())
            .await?;
            rows.iter().map(bonus_from_row).collect()
        })
        .await
    }

    async fn pending_reconciliation(&self, limit: usize) -> StoreResult<Vec<PlayerBonus>> {
        with_default_timeout(async {
            let rows = sqlx::query(
                r#"
                SELECT data, version FROM player_bonuses
                WHERE has_pending_transition
                  AND status NOT IN ('completed', 'cancelled', 'expired', 'forfeited')
                ORDER BY claimed_at
                LIMIT $1
                "#,
            )
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.pool.as_ref())
            .await?;
            rows.iter().map(bonus_from_row).collect()
        })
        .await
    }

    async fn count_bonuses_for_template(&self, template_id: TemplateId) -> StoreResult<u64> {
        with_default_timeout(async {
            let row =
                sqlx::query("SELECT COUNT(*) AS count FROM player_bonuses WHERE template_id = $1")
                    .bind(template_id)
                    .fetch_one(self.pool.as_ref())
                    .await?;
            count_from_row(&row)
        })
        .await
    }

    async fn ledger_entries(&self, bonus_id: BonusId) -> StoreResult<Vec<LedgerEntry>> {
        with_default_timeout(async {
            let rows = sqlx::query(
                r#"
                SELECT id, bonus_id, player_id, entry_type, amount, resulting_balance,
                       created_at, note
                FROM bonus_ledger_entries
                WHERE bonus_id = $1
                ORDER BY seq
                "#,
            )
            .bind(bonus_id)
            .fetch_all(self.pool.as_ref())
            .await?;

            rows.iter()
                .map(|row| {
                    let entry_type: String = row.try_get("entry_type")?;
                    Ok(LedgerEntry {
                        id: row.try_get("id")?,
                        bonus_id: row.try_get("bonus_id")?,
                        player_id: row.try_get("player_id")?,
                        entry_type: entry_type.parse().map_err(StoreError::Corrupt)?,
                        amount: row.try_get("amount")?,
                        resulting_balance: row.try_get("resulting_balance")?,
                        timestamp: row.try_get("created_at")?,
                        note: row.try_get("note")?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn record_wager(&self, bet: &BetSettlement) -> StoreResult<bool> {
        with_default_timeout(async {
            let result = sqlx::query(
                r#"
                INSERT INTO settled_wagers (bet_id, player_id, settled_at, data)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (player_id, bet_id) DO NOTHING
                "#,
            )
            .bind(&bet.bet_id)
            .bind(bet.player_id)
            .bind(bet.settled_at)
            .bind(Json(bet))
            .execute(self.pool.as_ref())
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn wagers_between(
        &self,
        player_id: PlayerId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BetSettlement>> {
        with_default_timeout(async {
            let rows = sqlx::query(
                r#"
                SELECT data FROM settled_wagers
                WHERE player_id = $1 AND settled_at >= $2 AND settled_at <= $3
                ORDER BY settled_at
                "#,
            )
            .bind(player_id)
            .bind(from)
            .bind(to)
            .fetch_all(self.pool.as_ref())
            .await?;
            rows.iter()
                .map(|row| {
                    let Json(bet): Json<BetSettlement> = row.try_get("data")?;
                    Ok(bet)
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl CashbackLevelRepository for PgStore {
    async fn list_levels(&self) -> StoreResult<Vec<CashbackLevel>> {
        with_default_timeout(async {
            let rows = sqlx::query("SELECT data FROM cashback_levels ORDER BY tier")
                .fetch_all(self.pool.as_ref())
                .await?;
            rows.iter()
                .map(|row| {
                    let Json(level): Json<CashbackLevel> = row.try_get("data")?;
                    Ok(level)
                })
                .collect()
        })
        .await
    }

    async fn insert_level(&self, level: &CashbackLevel) -> StoreResult<()> {
        with_default_timeout(async {
            let result = sqlx::query(
                r#"
                INSERT INTO cashback_levels (tier, min_monthly_wager, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (tier) DO NOTHING
                "#,
            )
            .bind(i64::from(level.tier))
            .bind(level.min_monthly_wager)
            .bind(Json(level))
            .execute(self.pool.as_ref())
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Duplicate(format!("cashback tier {}", level.tier)));
            }
            Ok(())
        })
        .await
    }

    async fn save_level(&self, level: &CashbackLevel) -> StoreResult<()> {
        with_default_timeout(async {
            let result = sqlx::query(
                "UPDATE cashback_levels SET min_monthly_wager = $2, data = $3 WHERE tier = $1",
            )
            .bind(i64::from(level.tier))
            .bind(level.min_monthly_wager)
            .bind(Json(level))
            .execute(self.pool.as_ref())
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::LevelNotFound(level.tier));
            }
            Ok(())
        })
        .await
    }
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &LedgerEntry,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bonus_ledger_entries
            (id, bonus_id, player_id, entry_type, amount, resulting_balance, created_at, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.id)
    .bind(entry.bonus_id)
    .bind(entry.player_id)
    .bind(entry.entry_type.to_string())
    .bind(entry.amount)
    .bind(entry.resulting_balance)
    .bind(entry.timestamp)
    .bind(&entry.note)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
