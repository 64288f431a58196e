//! Wallet collaborator interface.

use async_trait::async_trait;

use super::{
    errors::WalletResult,
    models::{WalletReason, WalletReceipt},
};
use crate::ledger::PlayerId;

/// Narrow credit/debit interface to the player wallet.
///
/// Implementations must honour `idempotency_key`: a repeated key returns
/// the original receipt with `replayed = true` and moves nothing.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Add withdrawable funds
    async fn credit(
        &self,
        player_id: PlayerId,
        amount: i64,
        reason: &WalletReason,
        idempotency_key: &str,
    ) -> WalletResult<WalletReceipt>;

    /// Remove bonus funds. Forfeitures never touch the withdrawable balance.
    async fn debit(
        &self,
        player_id: PlayerId,
        amount: i64,
        reason: &WalletReason,
        idempotency_key: &str,
    ) -> WalletResult<WalletReceipt>;
}
