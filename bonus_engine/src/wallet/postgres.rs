//! PostgreSQL wallet with idempotent, single-transaction movements.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    errors::{WalletError, WalletResult},
    models::{EntryDirection, WalletReason, WalletReceipt},
    service::WalletService,
};
use crate::ledger::PlayerId;

/// Wallet backed by the `bonus_wallets` / `bonus_wallet_entries` tables
#[derive(Clone)]
pub struct PgWallet {
    pool: Arc<PgPool>,
}

impl PgWallet {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Current withdrawable balance, 0 for an unknown player
    pub async fn withdrawable(&self, player_id: PlayerId) -> WalletResult<i64> {
        let row = sqlx::query("SELECT withdrawable FROM bonus_wallets WHERE player_id = $1")
            .bind(player_id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(match row {
            Some(row) => row.try_get("withdrawable")?,
            None => 0,
        })
    }

    async fn apply(
        &self,
        player_id: PlayerId,
        amount: i64,
        direction: EntryDirection,
        reason: &WalletReason,
        idempotency_key: &str,
    ) -> WalletResult<WalletReceipt> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;

        // Serialises concurrent callers on the same key
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(idempotency_key)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query(
            r#"
            SELECT id, player_id, amount, direction, reason, balance_after,
                   idempotency_key, created_at
            FROM bonus_wallet_entries
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            let original = receipt_from_row(&row)?;
            tx.rollback().await?;
            if original.player_id != player_id
                || original.amount != amount
                || original.direction != direction
            {
                return Err(WalletError::IdempotencyMismatch(idempotency_key.to_string()));
            }
            return Ok(WalletReceipt {
                replayed: true,
                ..original
            });
        }

        let balance_after = self.move_funds(&mut tx, player_id, amount, direction).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO bonus_wallet_entries
                (id, player_id, amount, direction, reason, balance_after, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, player_id, amount, direction, reason, balance_after,
                      idempotency_key, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(player_id)
        .bind(amount)
        .bind(direction.to_string())
        .bind(Json(reason))
        .bind(balance_after)
        .bind(idempotency_key)
        .fetch_one(&mut *tx)
        .await?;

        let receipt = receipt_from_row(&row)?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn move_funds(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        player_id: PlayerId,
        amount: i64,
        direction: EntryDirection,
    ) -> WalletResult<i64> {
        let (withdrawable_delta, forfeited_delta) = match direction {
            EntryDirection::Credit => (amount, 0),
            EntryDirection::Debit => (0, amount),
        };
        let row = sqlx::query(
            r#"
            INSERT INTO bonus_wallets (player_id, withdrawable, forfeited, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (player_id)
            DO UPDATE SET
                withdrawable = bonus_wallets.withdrawable + EXCLUDED.withdrawable,
                forfeited = bonus_wallets.forfeited + EXCLUDED.forfeited,
                updated_at = NOW()
            RETURNING withdrawable
            "#,
        )
        .bind(player_id)
        .bind(withdrawable_delta)
        .bind(forfeited_delta)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.try_get("withdrawable")?)
    }
}

fn receipt_from_row(row: &PgRow) -> WalletResult<WalletReceipt> {
    let direction: String = row.try_get("direction")?;
    let direction = match direction.as_str() {
        "credit" => EntryDirection::Credit,
        _ => EntryDirection::Debit,
    };
    let Json(reason): Json<WalletReason> = row.try_get("reason")?;
    Ok(WalletReceipt {
        entry_id: row.try_get("id")?,
        player_id: row.try_get("player_id")?,
        amount: row.try_get("amount")?,
        direction,
        reason,
        idempotency_key: row.try_get("idempotency_key")?,
        balance_after: row.try_get("balance_after")?,
        replayed: false,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl WalletService for PgWallet {
    async fn credit(
        &self,
        player_id: PlayerId,
        amount: i64,
        reason: &WalletReason,
        idempotency_key: &str,
    ) -> WalletResult<WalletReceipt> {
        self.apply(player_id, amount, EntryDirection::Credit, reason, idempotency_key)
            .await
    }

    async fn debit(
        &self,
        player_id: PlayerId,
        amount: i64,
        reason: &WalletReason,
        idempotency_key: &str,
    ) -> WalletResult<WalletReceipt> {
        self.apply(player_id, amount, EntryDirection::Debit, reason, idempotency_key)
            .await
    }
}
