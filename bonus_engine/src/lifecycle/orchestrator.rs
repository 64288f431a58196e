//! Bonus lifecycle orchestrator.
//!
//! Drives claims, wagering updates and terminal transitions. Every mutation
//! of a bonus happens under its per-id lock and is persisted with a
//! compare-and-swap on the record version.
//!
//! Terminal transitions that move money follow one protocol:
//!
//! 1. reserve: write `pending_transition` so no other terminal transition
//!    can start;
//! 2. call the wallet with the key `{bonus_id}:{transition}` under the
//!    retry policy;
//! 3. commit: status, zero balance, conversion/forfeiture entry.
//!
//! If the wallet never answers, the bonus keeps its non-terminal status with
//! the reservation in place and [`BonusOrchestrator::reconcile`] re-drives
//! it later. The idempotency key makes the re-drive safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::errors::{BonusError, BonusResult};
use crate::{
    cashback::{CashbackError, CashbackTierEngine},
    catalog::{BonusKind, Category, GrantContext, PayoutRule, TemplateId, TemplateStatus},
    clock::Clock,
    db::{BonusRepository, Page, StoreError, TemplateRepository},
    ledger::{
        BonusFilter, BonusId, BonusStatus, HistoryAction, LedgerEntry, LedgerEntryType,
        PendingTransition, PlayerBonus, PlayerId, TransitionKind,
    },
    locks::{KeyedLocks, KeyedRwLocks},
    stats::BonusStats,
    wagering::{BetSettlement, combo_boost_amount, contribution},
    wallet::{RetryPolicy, WalletReason, WalletReceipt, WalletService},
};

/// Attempts at a compare-and-swap before giving up
pub const MAX_CONFLICT_RETRIES: usize = 5;

/// Actor recorded for engine-driven changes
pub const SYSTEM_ACTOR: &str = "system";

/// Actor recorded for expiry sweeps
pub const SWEEPER_ACTOR: &str = "sweeper";

fn default_actor() -> String {
    "player".to_string()
}

fn default_channel() -> Category {
    Category::All
}

/// Claim request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub player_id: PlayerId,
    pub template_id: TemplateId,
    /// Qualifying deposit for deposit-based bonuses
    #[serde(default)]
    pub deposit_amount: Option<i64>,
    /// Product area the claim comes from
    #[serde(default = "default_channel")]
    pub channel: Category,
    #[serde(default = "default_actor")]
    pub actor: String,
}

/// Progress change of one bonus caused by a bet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BonusProgressUpdate {
    pub bonus_id: BonusId,
    pub credited: i64,
    pub completed: i64,
    pub requirement: i64,
    pub progress_pct: f64,
    pub status: BonusStatus,
}

/// Boost drawn from a combo boost bonus for a winning ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoostPayout {
    pub bonus_id: BonusId,
    pub amount: i64,
}

/// What a bet settlement did to the player's bonuses
#[derive(Debug, Clone, Default, Serialize)]
pub struct SettlementReport {
    pub bet_id: String,
    pub player_id: PlayerId,
    /// False when the wager itself had been recorded before
    pub newly_recorded: bool,
    pub updates: Vec<BonusProgressUpdate>,
    /// Bonuses that had already processed this bet
    pub replayed: Vec<BonusId>,
    pub completed: Vec<BonusId>,
    pub boosts: Vec<BoostPayout>,
    pub failed: Vec<(BonusId, String)>,
}

/// Result of an expiry attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ExpireOutcome {
    Expired(Box<PlayerBonus>),
    Skipped(String),
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub committed: usize,
    pub failed: usize,
}

enum BetApplication {
    Applied {
        update: BonusProgressUpdate,
        boost: Option<BoostPayout>,
        satisfied: bool,
    },
    Replayed,
    Skipped,
}

/// Drives the player bonus state machine
pub struct BonusOrchestrator {
    templates: Arc<dyn TemplateRepository>,
    bonuses: Arc<dyn BonusRepository>,
    cashback: Arc<CashbackTierEngine>,
    wallet: Arc<dyn WalletService>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    bonus_locks: KeyedLocks<BonusId>,
    claim_locks: KeyedLocks<(PlayerId, TemplateId)>,
    template_locks: Arc<KeyedRwLocks<TemplateId>>,
}

impl BonusOrchestrator {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        bonuses: Arc<dyn BonusRepository>,
        cashback: Arc<CashbackTierEngine>,
        wallet: Arc<dyn WalletService>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            templates,
            bonuses,
            cashback,
            wallet,
            clock,
            retry,
            bonus_locks: KeyedLocks::new(),
            claim_locks: KeyedLocks::new(),
            template_locks: Arc::new(KeyedRwLocks::new()),
        }
    }

    /// Share the catalog's per-template gate so claims never interleave
    /// with an edit of the same template.
    pub fn with_template_locks(mut self, locks: Arc<KeyedRwLocks<TemplateId>>) -> Self {
        self.template_locks = locks;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ---------------------------------------------------------------- claims

    /// Claim a template for a player.
    ///
    /// The bonus and its credit entry are stored atomically. A template with
    /// a zero wagering requirement completes right away.
    ///
    /// # Errors
    ///
    /// * `BonusError::TemplateInactive` - template is draft or paused
    /// * `BonusError::EligibilityNotMet` - channel, tier or deposit rules fail
    /// * `BonusError::AlreadyClaimed` - open bonus from the same template
    pub async fn claim(&self, request: ClaimRequest) -> BonusResult<PlayerBonus> {
        if request.player_id <= 0 {
            return Err(BonusError::Validation("player_id is required".to_string()));
        }
        if request.deposit_amount.is_some_and(|d| d < 0) {
            return Err(BonusError::Validation(
                "deposit_amount must not be negative".to_string(),
            ));
        }

        let template_gate = self.template_locks.read(request.template_id).await;
        let _claim_guard = self
            .claim_locks
            .lock((request.player_id, request.template_id))
            .await;

        let template = self
            .templates
            .get_template(request.template_id)
            .await?
            .ok_or(BonusError::TemplateNotFound(request.template_id))?;

        if template.status != TemplateStatus::Active {
            return Err(BonusError::TemplateInactive {
                template_id: template.id,
                status: template.status,
            });
        }

        if !template.category.accepts_channel(request.channel) {
            return Err(BonusError::EligibilityNotMet(format!(
                "{} bonus cannot be claimed from {}",
                template.category, request.channel
            )));
        }

        if !template.eligibility.allow_repeat {
            let open = self
                .bonuses
                .non_terminal_for_template(request.player_id, template.id)
                .await?;
            if let Some(existing) = open.first() {
                return Err(BonusError::AlreadyClaimed {
                    existing: existing.id,
                    status: existing.status,
                });
            }
        }

        if let Some(min_tier) = template.eligibility.min_tier {
            let tier = match self.cashback.current_tier(request.player_id).await {
                Ok(level) => level.tier,
                Err(CashbackError::NoLevelsConfigured) => {
                    return Err(BonusError::EligibilityNotMet(
                        "no cashback tiers configured".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            if tier < min_tier {
                return Err(BonusError::EligibilityNotMet(format!(
                    "requires tier {min_tier}, player is tier {tier}"
                )));
            }
        }

        let net_loss = match &template.kind {
            BonusKind::Cashback(terms) => Some(
                self.cashback
                    .period_net_loss(request.player_id, terms.period)
                    .await?,
            ),
            _ => None,
        };
        let ctx = GrantContext {
            deposit_amount: request.deposit_amount,
            net_loss,
        };
        let grant = template
            .kind
            .grant(&template.value, &ctx)
            .map_err(BonusError::EligibilityNotMet)?;
        if grant.amount <= 0 {
            return Err(BonusError::EligibilityNotMet(
                "the offer grants nothing for this claim".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut bonus = PlayerBonus::pending(request.player_id, &template, grant, now);
        bonus.record(HistoryAction::Claimed, &request.actor, None, now);
        bonus.transition(BonusStatus::Active)?;
        bonus.record(
            HistoryAction::Activated,
            SYSTEM_ACTOR,
            Some(format!("credited {}", bonus.bonus_amount)),
            now,
        );

        let credit = LedgerEntry::new(
            &bonus,
            LedgerEntryType::Credit,
            bonus.bonus_amount,
            Some(format!("claimed from template {}", template.name)),
            now,
        );
        self.bonuses.insert_claim(&bonus, &[credit]).await?;
        drop(template_gate);

        log::info!(
            "Player {} claimed {} bonus {} from template {}: amount {}, requirement {}",
            bonus.player_id,
            bonus.bonus_type(),
            bonus.id,
            template.id,
            bonus.bonus_amount,
            bonus.wagering.requirement
        );

        if bonus.wagering.is_satisfied() {
            let _guard = self.bonus_locks.lock(bonus.id).await;
            match self
                .finish_locked(bonus.clone(), TransitionKind::Completed, None, SYSTEM_ACTOR)
                .await
            {
                Ok(completed) => return Ok(completed),
                Err(e) => {
                    log::error!("Immediate completion of bonus {} failed: {}", bonus.id, e);
                    return self.get_bonus(bonus.id).await;
                }
            }
        }

        Ok(bonus)
    }

    // -------------------------------------------------------------- wagering

    /// Apply a settled bet to every open bonus of its player.
    ///
    /// Idempotent per (bonus, bet): a replayed bet is reported under
    /// `replayed` and changes nothing.
    pub async fn record_bet_settlement(&self, bet: BetSettlement) -> BonusResult<SettlementReport> {
        if bet.bet_id.trim().is_empty() {
            return Err(BonusError::Validation("bet_id is required".to_string()));
        }

        let newly_recorded = self.bonuses.record_wager(&bet).await?;
        let open = self.bonuses.open_bonuses_for_player(bet.player_id).await?;

        let mut report = SettlementReport {
            bet_id: bet.bet_id.clone(),
            player_id: bet.player_id,
            newly_recorded,
            ..Default::default()
        };

        for bonus in open {
            match self.apply_bet(bonus.id, &bet).await {
                Ok(BetApplication::Applied {
                    update,
                    boost,
                    satisfied,
                }) => {
                    if let Some(boost) = boost {
                        report.boosts.push(boost);
                    }
                    if satisfied {
                        match self.complete(update.bonus_id).await {
                            Ok(_) => report.completed.push(update.bonus_id),
                            Err(e) => {
                                log::error!("Completion of bonus {} failed: {}", update.bonus_id, e);
                                report.failed.push((update.bonus_id, e.client_message()));
                            }
                        }
                    }
                    report.updates.push(update);
                }
                Ok(BetApplication::Replayed) => report.replayed.push(bonus.id),
                Ok(BetApplication::Skipped) => {}
                Err(e) => {
                    log::error!("Applying bet {} to bonus {} failed: {}", bet.bet_id, bonus.id, e);
                    report.failed.push((bonus.id, e.client_message()));
                }
            }
        }

        Ok(report)
    }

    async fn apply_bet(&self, bonus_id: BonusId, bet: &BetSettlement) -> BonusResult<BetApplication> {
        let _guard = self.bonus_locks.lock(bonus_id).await;

        for _ in 0..MAX_CONFLICT_RETRIES {
            let mut bonus = self.load(bonus_id).await?;

            if !bonus.status.is_open() || bonus.pending_transition.is_some() {
                return Ok(BetApplication::Skipped);
            }
            if bonus.processed_bets.contains(&bet.bet_id) {
                log::debug!("Bet {} already applied to bonus {}", bet.bet_id, bonus_id);
                return Ok(BetApplication::Replayed);
            }

            let now = self.clock.now();
            let mut entries = Vec::new();
            bonus.processed_bets.insert(bet.bet_id.clone());

            if bet.funded_by == Some(bonus.id) {
                self.consume_funding(&mut bonus, bet, now, &mut entries)?;
            }

            let in_window = bet.settled_at >= bonus.claimed_at && bet.settled_at <= bonus.wager_deadline;
            let credit = if bet.free_bet || !in_window {
                0
            } else {
                contribution(bet, &bonus.snapshot)
            };

            let (applied, started) = bonus.apply_contribution(credit)?;
            if started {
                bonus.record(HistoryAction::WageringStarted, SYSTEM_ACTOR, None, now);
            }
            if applied > 0 {
                bonus.record(
                    HistoryAction::WagerRecorded,
                    SYSTEM_ACTOR,
                    Some(format!("bet {}: +{}", bet.bet_id, applied)),
                    now,
                );
            }

            let mut boost = None;
            let owed = if in_window {
                combo_boost_amount(bet, &bonus.snapshot)
            } else {
                0
            };
            if owed > 0 {
                let paid = bonus.debit_funds(owed)?;
                if paid > 0 {
                    bonus.record(
                        HistoryAction::ComboBoostPaid,
                        SYSTEM_ACTOR,
                        Some(format!("bet {}: {}", bet.bet_id, paid)),
                        now,
                    );
                    entries.push(LedgerEntry::new(
                        &bonus,
                        LedgerEntryType::Debit,
                        paid,
                        Some(format!("combo boost on bet {}", bet.bet_id)),
                        now,
                    ));
                    boost = Some(BoostPayout {
                        bonus_id,
                        amount: paid,
                    });
                }
            }

            match self.bonuses.update_bonus(&bonus, &entries).await {
                Ok(version) => bonus.version = version,
                Err(StoreError::VersionConflict { .. }) => {
                    log::debug!("Version conflict on bonus {}, reloading", bonus_id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            return Ok(BetApplication::Applied {
                update: BonusProgressUpdate {
                    bonus_id,
                    credited: applied,
                    completed: bonus.wagering.completed,
                    requirement: bonus.wagering.requirement,
                    progress_pct: bonus.wagering.progress_pct,
                    status: bonus.status,
                },
                boost,
                satisfied: bonus.wagering.is_satisfied(),
            });
        }

        Err(BonusError::ConcurrentModification(bonus_id))
    }

    /// Free bet token and bonus balance drawn by a ticket this bonus paid for.
    fn consume_funding(
        &self,
        bonus: &mut PlayerBonus,
        bet: &BetSettlement,
        now: DateTime<Utc>,
        entries: &mut Vec<LedgerEntry>,
    ) -> BonusResult<()> {
        if bet.free_bet {
            match bonus.use_free_bet(now) {
                Ok(remaining) => bonus.record(
                    HistoryAction::FreeBetUsed,
                    SYSTEM_ACTOR,
                    Some(format!("bet {}, {} left", bet.bet_id, remaining)),
                    now,
                ),
                Err(e) => log::warn!("Free bet on bet {} not applied: {}", bet.bet_id, e),
            }
        }

        if bet.bonus_funds_used > 0 {
            let taken = bonus.debit_funds(bet.bonus_funds_used)?;
            if taken < bet.bonus_funds_used {
                log::warn!(
                    "Bet {} used {} bonus funds but bonus {} only had {}",
                    bet.bet_id,
                    bet.bonus_funds_used,
                    bonus.id,
                    taken
                );
            }
            if taken > 0 {
                bonus.record(
                    HistoryAction::BonusFundsUsed,
                    SYSTEM_ACTOR,
                    Some(format!("bet {}: {}", bet.bet_id, taken)),
                    now,
                );
                entries.push(LedgerEntry::new(
                    bonus,
                    LedgerEntryType::Debit,
                    taken,
                    Some(format!("stake of bet {}", bet.bet_id)),
                    now,
                ));
            }
        }
        Ok(())
    }

    // --------------------------------------------------- terminal transitions

    async fn complete(&self, bonus_id: BonusId) -> BonusResult<PlayerBonus> {
        let _guard = self.bonus_locks.lock(bonus_id).await;
        let bonus = self.load(bonus_id).await?;
        if !bonus.wagering.is_satisfied() || !bonus.status.is_open() {
            return Ok(bonus);
        }
        self.finish_locked(bonus, TransitionKind::Completed, None, SYSTEM_ACTOR)
            .await
    }

    /// Admin cancellation. Remaining funds are forfeited.
    pub async fn cancel(&self, bonus_id: BonusId, reason: &str, actor: &str) -> BonusResult<PlayerBonus> {
        self.close(bonus_id, TransitionKind::Cancelled, reason, actor)
            .await
    }

    /// Out-of-band rule violation. Balance handling matches cancellation.
    pub async fn forfeit(
        &self,
        bonus_id: BonusId,
        violation: &str,
        actor: &str,
    ) -> BonusResult<PlayerBonus> {
        self.close(bonus_id, TransitionKind::Forfeited, violation, actor)
            .await
    }

    async fn close(
        &self,
        bonus_id: BonusId,
        kind: TransitionKind,
        reason: &str,
        actor: &str,
    ) -> BonusResult<PlayerBonus> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BonusError::Validation(format!(
                "a reason is required to mark a bonus {kind}"
            )));
        }
        let _guard = self.bonus_locks.lock(bonus_id).await;
        let bonus = self.load(bonus_id).await?;
        log::info!("{} requested {} of bonus {}: {}", actor, kind, bonus_id, reason);
        self.finish_locked(bonus, kind, Some(reason.to_string()), actor)
            .await
    }

    /// Expire a bonus whose wagering deadline has passed.
    ///
    /// Bonuses that are already terminal, not yet due, or busy with another
    /// terminal transition are skipped without change.
    pub async fn expire(&self, bonus_id: BonusId) -> BonusResult<ExpireOutcome> {
        let _guard = self.bonus_locks.lock(bonus_id).await;
        let bonus = self.load(bonus_id).await?;
        let now = self.clock.now();

        if bonus.status.is_terminal() {
            return Ok(ExpireOutcome::Skipped(format!("already {}", bonus.status)));
        }
        if !bonus.status.is_open() {
            return Ok(ExpireOutcome::Skipped(format!("status {}", bonus.status)));
        }
        if bonus.wager_deadline >= now {
            return Ok(ExpireOutcome::Skipped("deadline not reached".to_string()));
        }
        if let Some(pending) = &bonus.pending_transition {
            return Ok(ExpireOutcome::Skipped(format!(
                "{} transition pending",
                pending.target
            )));
        }

        let expired = self
            .finish_locked(
                bonus,
                TransitionKind::Expired,
                Some("wagering deadline passed".to_string()),
                SWEEPER_ACTOR,
            )
            .await?;
        Ok(ExpireOutcome::Expired(Box::new(expired)))
    }

    /// Re-drive a reserved transition whose wallet call did not complete.
    pub async fn reconcile(&self, bonus_id: BonusId) -> BonusResult<PlayerBonus> {
        let _guard = self.bonus_locks.lock(bonus_id).await;
        let bonus = self.load(bonus_id).await?;
        let Some(pending) = bonus.pending_transition.clone() else {
            return Ok(bonus);
        };
        log::info!(
            "Reconciling {} of bonus {} (attempt {})",
            pending.target,
            bonus_id,
            pending.attempts + 1
        );
        self.finish_locked(bonus, pending.target, pending.reason, &pending.actor)
            .await
    }

    /// Reconcile up to `limit` flagged bonuses.
    pub async fn reconcile_pending(&self, limit: usize) -> BonusResult<ReconcileReport> {
        let pending = self.bonuses.pending_reconciliation(limit).await?;
        let mut report = ReconcileReport::default();
        for bonus in pending {
            report.attempted += 1;
            match self.reconcile(bonus.id).await {
                Ok(b) if b.status.is_terminal() => report.committed += 1,
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    log::warn!("Reconciliation of bonus {} failed: {}", bonus.id, e);
                }
            }
        }
        Ok(report)
    }

    /// Reserve, call the wallet, commit. The caller holds the bonus lock.
    async fn finish_locked(
        &self,
        bonus: PlayerBonus,
        kind: TransitionKind,
        reason: Option<String>,
        actor: &str,
    ) -> BonusResult<PlayerBonus> {
        let bonus = self.reserve(bonus, kind, reason, actor).await?;
        if bonus.status.is_terminal() {
            return Ok(bonus);
        }

        let receipt = match self.move_funds(&bonus, kind).await {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.flag_for_reconciliation(bonus, kind, e).await),
        };

        self.commit(bonus, kind, receipt).await
    }

    async fn reserve(
        &self,
        mut bonus: PlayerBonus,
        kind: TransitionKind,
        reason: Option<String>,
        actor: &str,
    ) -> BonusResult<PlayerBonus> {
        let target = kind.target_status();
        for _ in 0..MAX_CONFLICT_RETRIES {
            if bonus.status.is_terminal() || !bonus.status.can_transition_to(target) {
                return Err(BonusError::InvalidTransition {
                    bonus_id: bonus.id,
                    from: bonus.status,
                    to: target,
                });
            }

            match &bonus.pending_transition {
                Some(pending) if pending.target == kind => return Ok(bonus),
                Some(pending) => {
                    return Err(BonusError::TransitionInProgress {
                        bonus_id: bonus.id,
                        pending: pending.target,
                    });
                }
                None => {}
            }

            let now = self.clock.now();
            bonus.pending_transition = Some(PendingTransition {
                target: kind,
                reason: reason.clone(),
                actor: actor.to_string(),
                requested_at: now,
                attempts: 0,
                last_error: None,
            });
            bonus.record(HistoryAction::TransitionRequested, actor, reason.clone(), now);

            match self.bonuses.update_bonus(&bonus, &[]).await {
                Ok(version) => {
                    bonus.version = version;
                    return Ok(bonus);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    bonus = self.load(bonus.id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BonusError::ConcurrentModification(bonus.id))
    }

    async fn move_funds(
        &self,
        bonus: &PlayerBonus,
        kind: TransitionKind,
    ) -> Result<Option<WalletReceipt>, crate::wallet::WalletError> {
        let amount = bonus.bonus_remaining;
        if amount <= 0 {
            return Ok(None);
        }

        let key = bonus.idempotency_key(kind);
        let reason = if kind.converts() {
            WalletReason::BonusConversion { bonus_id: bonus.id }
        } else {
            WalletReason::BonusForfeiture {
                bonus_id: bonus.id,
                cause: kind,
            }
        };
        let label = format!("wallet {kind} for bonus {}", bonus.id);
        let wallet = self.wallet.as_ref();
        let player_id = bonus.player_id;
        let reason = &reason;
        let key = key.as_str();

        let receipt = self
            .retry
            .execute(&label, move || async move {
                if kind.converts() {
                    wallet.credit(player_id, amount, reason, key).await
                } else {
                    wallet.debit(player_id, amount, reason, key).await
                }
            })
            .await?;

        if receipt.replayed {
            log::info!("Wallet replayed {} for bonus {}", receipt.idempotency_key, bonus.id);
        }
        Ok(Some(receipt))
    }

    async fn flag_for_reconciliation(
        &self,
        mut bonus: PlayerBonus,
        kind: TransitionKind,
        error: crate::wallet::WalletError,
    ) -> BonusError {
        let now = self.clock.now();
        if let Some(pending) = bonus.pending_transition.as_mut() {
            pending.attempts += 1;
            pending.last_error = Some(error.to_string());
        }
        bonus.record(
            HistoryAction::WalletCallFailed,
            SYSTEM_ACTOR,
            Some(error.to_string()),
            now,
        );

        log::error!(
            "Wallet {} for bonus {} failed after retries: {}; flagged for reconciliation",
            kind,
            bonus.id,
            error
        );

        if let Err(e) = self.bonuses.update_bonus(&bonus, &[]).await {
            log::error!("Could not record wallet failure on bonus {}: {}", bonus.id, e);
        }

        BonusError::ReconciliationRequired {
            bonus_id: bonus.id,
            transition: kind,
            reason: error.client_message(),
        }
    }

    async fn commit(
        &self,
        mut bonus: PlayerBonus,
        kind: TransitionKind,
        receipt: Option<WalletReceipt>,
    ) -> BonusResult<PlayerBonus> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let pending = bonus.pending_transition.clone();
            let actor = pending
                .as_ref()
                .map_or(SYSTEM_ACTOR.to_string(), |p| p.actor.clone());
            let reason = pending.and_then(|p| p.reason);
            let now = self.clock.now();

            let moved = bonus.commit_terminal(kind)?;
            let action = match kind {
                TransitionKind::Completed => HistoryAction::Completed,
                TransitionKind::Expired => HistoryAction::Expired,
                TransitionKind::Cancelled => HistoryAction::Cancelled,
                TransitionKind::Forfeited => HistoryAction::Forfeited,
            };
            let note = match (&reason, &receipt) {
                (Some(reason), _) => Some(reason.clone()),
                (None, Some(r)) => Some(format!("wallet entry {}", r.entry_id)),
                (None, None) => None,
            };
            bonus.record(action, &actor, note, now);

            let mut entries = Vec::new();
            if moved > 0 {
                let entry_type = if kind.converts() {
                    LedgerEntryType::Conversion
                } else {
                    LedgerEntryType::Forfeiture
                };
                entries.push(LedgerEntry::new(
                    &bonus,
                    entry_type,
                    moved,
                    Some(bonus.idempotency_key(kind)),
                    now,
                ));
            }

            match self.bonuses.update_bonus(&bonus, &entries).await {
                Ok(version) => {
                    bonus.version = version;
                    log::info!(
                        "Bonus {} of player {} {}: {} moved",
                        bonus.id,
                        bonus.player_id,
                        bonus.status,
                        moved
                    );
                    return Ok(bonus);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    let reloaded = self.load(bonus.id).await?;
                    if reloaded.status.is_terminal() {
                        return Ok(reloaded);
                    }
                    bonus = reloaded;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BonusError::ConcurrentModification(bonus.id))
    }

    // --------------------------------------------------------------- queries

    async fn load(&self, bonus_id: BonusId) -> BonusResult<PlayerBonus> {
        self.bonuses
            .get_bonus(bonus_id)
            .await?
            .ok_or(BonusError::BonusNotFound(bonus_id))
    }

    pub async fn get_bonus(&self, bonus_id: BonusId) -> BonusResult<PlayerBonus> {
        self.load(bonus_id).await
    }

    /// Bonus together with its ledger entries
    pub async fn bonus_with_entries(
        &self,
        bonus_id: BonusId,
    ) -> BonusResult<(PlayerBonus, Vec<LedgerEntry>)> {
        let bonus = self.load(bonus_id).await?;
        let entries = self.bonuses.ledger_entries(bonus_id).await?;
        Ok((bonus, entries))
    }

    pub async fn list_bonuses(&self, filter: &BonusFilter) -> BonusResult<Page<PlayerBonus>> {
        Ok(self.bonuses.list_bonuses(filter).await?)
    }

    /// Open bonuses past their deadline, oldest deadline first
    pub async fn due_for_expiry(&self, limit: usize) -> BonusResult<Vec<PlayerBonus>> {
        Ok(self
            .bonuses
            .due_for_expiry(self.clock.now(), limit)
            .await?)
    }

    /// Aggregate claim and conversion statistics
    pub async fn stats(&self) -> BonusResult<BonusStats> {
        let totals = self.bonuses.bonus_totals().await?;
        Ok(BonusStats::from_totals(&totals))
    }
}
