//! In-process wallet with an entry journal and fault injection.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

use super::{
    errors::{WalletError, WalletResult},
    models::{EntryDirection, WalletReason, WalletReceipt},
    service::WalletService,
};
use crate::ledger::PlayerId;

#[derive(Debug, Default, Clone, Copy)]
struct Account {
    withdrawable: i64,
    forfeited: i64,
}

#[derive(Default)]
struct State {
    accounts: HashMap<PlayerId, Account>,
    journal: Vec<WalletReceipt>,
    by_key: HashMap<String, usize>,
}

/// Wallet used by tests and the sandbox backend
#[derive(Default)]
pub struct MemoryWallet {
    state: Mutex<State>,
    fail_next: AtomicU32,
    delay: Mutex<Option<Duration>>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with `Unavailable`
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call, to provoke timeouts
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn withdrawable(&self, player_id: PlayerId) -> i64 {
        self.lock()
            .accounts
            .get(&player_id)
            .map_or(0, |a| a.withdrawable)
    }

    /// Total bonus funds forfeited by a player
    pub fn forfeited(&self, player_id: PlayerId) -> i64 {
        self.lock().accounts.get(&player_id).map_or(0, |a| a.forfeited)
    }

    /// Every committed movement in order
    pub fn journal(&self) -> Vec<WalletReceipt> {
        self.lock().journal.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn inject_faults(&self) -> WalletResult<()> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(WalletError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn apply(
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

        let mut state = self.lock();

        if let Some(&idx) = state.by_key.get(idempotency_key) {
            let original = &state.journal[idx];
            if original.player_id != player_id
                || original.amount != amount
                || original.direction != direction
            {
                return Err(WalletError::IdempotencyMismatch(idempotency_key.to_string()));
            }
            let mut replay = original.clone();
            replay.replayed = true;
            return Ok(replay);
        }

        let account = state.accounts.entry(player_id).or_default();
        match direction {
            EntryDirection::Credit => account.withdrawable += amount,
            EntryDirection::Debit => account.forfeited += amount,
        }
        let balance_after = account.withdrawable;

        let receipt = WalletReceipt {
            entry_id: Uuid::new_v4(),
            player_id,
            amount,
            direction,
            reason: reason.clone(),
            idempotency_key: idempotency_key.to_string(),
            balance_after,
            replayed: false,
            created_at: Utc::now(),
        };
        let idx = state.journal.len();
        state.journal.push(receipt.clone());
        state.by_key.insert(idempotency_key.to_string(), idx);
        Ok(receipt)
    }
}

#[async_trait]
impl WalletService for MemoryWallet {
    async fn credit(
        &self,
        player_id: PlayerId,
        amount: i64,
        reason: &WalletReason,
        idempotency_key: &str,
    ) -> WalletResult<WalletReceipt> {
        self.inject_faults().await?;
        self.apply(player_id, amount, EntryDirection::Credit, reason, idempotency_key)
    }

    async fn debit(
        &self,
        player_id: PlayerId,
        amount: i64,
        reason: &WalletReason,
        idempotency_key: &str,
    ) -> WalletResult<WalletReceipt> {
        self.inject_faults().await?;
        self.apply(player_id, amount, EntryDirection::Debit, reason, idempotency_key)
    }
}
