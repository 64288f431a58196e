//! Player bonus records and ledger entries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};
use uuid::Uuid;

use super::errors::{LedgerError, LedgerResult};
use crate::catalog::{BonusTemplate, BonusType, Grant, PayoutRule, TemplateId, TemplateSnapshot};

/// Player ID type
pub type PlayerId = i64;

/// Player bonus ID type
pub type BonusId = Uuid;

/// Player bonus status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusStatus {
    Pending,
    Active,
    Wagering,
    Completed,
    Cancelled,
    Expired,
    Forfeited,
}

impl BonusStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BonusStatus::Completed
                | BonusStatus::Cancelled
                | BonusStatus::Expired
                | BonusStatus::Forfeited
        )
    }

    /// Bonus funds credited and still wagerable
    pub fn is_open(self) -> bool {
        matches!(self, BonusStatus::Active | BonusStatus::Wagering)
    }
}

impl fmt::Display for BonusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BonusStatus::Pending => write!(f, "pending"),
            BonusStatus::Active => write!(f, "active"),
            BonusStatus::Wagering => write!(f, "wagering"),
            BonusStatus::Completed => write!(f, "completed"),
            BonusStatus::Cancelled => write!(f, "cancelled"),
            BonusStatus::Expired => write!(f, "expired"),
            BonusStatus::Forfeited => write!(f, "forfeited"),
        }
    }
}

impl FromStr for BonusStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BonusStatus::Pending),
            "active" => Ok(BonusStatus::Active),
            "wagering" => Ok(BonusStatus::Wagering),
            "completed" => Ok(BonusStatus::Completed),
            "cancelled" => Ok(BonusStatus::Cancelled),
            "expired" => Ok(BonusStatus::Expired),
            "forfeited" => Ok(BonusStatus::Forfeited),
            other => Err(format!("unknown bonus status '{other}'")),
        }
    }
}

/// Terminal transition that moves money in or out of the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Completed,
    Expired,
    Cancelled,
    Forfeited,
}

impl TransitionKind {
    pub fn target_status(self) -> BonusStatus {
        match self {
            TransitionKind::Completed => BonusStatus::Completed,
            TransitionKind::Expired => BonusStatus::Expired,
            TransitionKind::Cancelled => BonusStatus::Cancelled,
            TransitionKind::Forfeited => BonusStatus::Forfeited,
        }
    }

    /// Completion converts, everything else forfeits
    pub fn converts(self) -> bool {
        self == TransitionKind::Completed
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target_status())
    }
}

/// Rollover progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WageringProgress {
    pub requirement: i64,
    pub completed: i64,
    pub progress_pct: f64,
}

impl WageringProgress {
    pub fn new(requirement: i64) -> Self {
        let mut progress = Self {
            requirement: requirement.max(0),
            completed: 0,
            progress_pct: 0.0,
        };
        progress.recompute();
        progress
    }

    /// Add a wager credit, clamped so `completed` never passes `requirement`.
    ///
    /// Returns the amount actually applied.
    pub fn add(&mut self, credit: i64) -> i64 {
        if credit <= 0 {
            return 0;
        }
        let room = self.requirement - self.completed;
        let applied = credit.min(room);
        self.completed += applied;
        self.recompute();
        applied
    }

    pub fn is_satisfied(&self) -> bool {
        self.completed >= self.requirement
    }

    fn recompute(&mut self) {
        self.progress_pct = if self.requirement == 0 {
            100.0
        } else {
            (self.completed as f64 / self.requirement as f64 * 100.0).min(100.0)
        };
    }
}

/// Free bet (or free spin) tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBetBalance {
    pub total: u32,
    pub used: u32,
    pub remaining: u32,
}

impl FreeBetBalance {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            used: 0,
            remaining: total,
        }
    }
}

/// Audit trail action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Claimed,
    Activated,
    WageringStarted,
    WagerRecorded,
    FreeBetUsed,
    BonusFundsUsed,
    ComboBoostPaid,
    TransitionRequested,
    WalletCallFailed,
    Completed,
    Expired,
    Cancelled,
    Forfeited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Terminal transition that was reserved but whose wallet call has not
/// committed yet. While set, no other terminal transition may start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub target: TransitionKind,
    pub reason: Option<String>,
    pub actor: String,
    pub requested_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// A claimed bonus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerBonus {
    pub id: BonusId,
    pub player_id: PlayerId,
    pub template_id: TemplateId,
    pub template_name: String,
    pub snapshot: TemplateSnapshot,
    pub bonus_amount: i64,
    pub bonus_remaining: i64,
    pub wagering: WageringProgress,
    pub free_bets: Option<FreeBetBalance>,
    pub status: BonusStatus,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub wager_deadline: DateTime<Utc>,
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub pending_transition: Option<PendingTransition>,
    /// Amount converted or forfeited by the terminal transition
    #[serde(default)]
    pub settled_amount: i64,
    /// Bets already applied, for replay detection
    #[serde(default)]
    pub processed_bets: BTreeSet<String>,
    /// Optimistic concurrency counter
    pub version: i64,
}

impl PlayerBonus {
    /// Build a bonus in `pending` status from a template and its grant.
    pub fn pending(
        player_id: PlayerId,
        template: &BonusTemplate,
        grant: Grant,
        now: DateTime<Utc>,
    ) -> Self {
        let snapshot = template.snapshot();
        let requirement = (grant.amount as f64 * snapshot.wagering.multiplier).round() as i64;
        let expires_at = now + Duration::days(i64::from(snapshot.validity.days_to_expire));
        let wager_deadline = now + Duration::days(i64::from(snapshot.validity.days_to_wager));

        Self {
            id: Uuid::new_v4(),
            player_id,
            template_id: template.id,
            template_name: template.name.clone(),
            snapshot,
            bonus_amount: grant.amount,
            bonus_remaining: grant.amount,
            wagering: WageringProgress::new(requirement),
            free_bets: grant.free_bets.map(FreeBetBalance::new),
            status: BonusStatus::Pending,
            claimed_at: now,
            expires_at,
            wager_deadline,
            history: Vec::new(),
            pending_transition: None,
            settled_amount: 0,
            processed_bets: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn bonus_type(&self) -> BonusType {
        self.snapshot.kind.bonus_type()
    }

    /// Wallet idempotency key for a terminal transition of this bonus
    pub fn idempotency_key(&self, kind: TransitionKind) -> String {
        format!("{}:{}", self.id, kind)
    }

    pub fn ensure_mutable(&self) -> LedgerResult<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::Terminal {
                bonus_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Append an audit entry
    pub fn record(
        &mut self,
        action: HistoryAction,
        actor: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.history.push(HistoryEntry {
            action,
            timestamp: now,
            actor: actor.to_string(),
            note,
        });
    }

    /// Move to `to`, validated against the lifecycle graph.
    pub fn transition(&mut self, to: BonusStatus) -> LedgerResult<()> {
        self.ensure_mutable()?;
        if !self.status.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                bonus_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Credit wagering progress. Returns `(applied, started_wagering)`.
    pub fn apply_contribution(&mut self, credit: i64) -> LedgerResult<(i64, bool)> {
        self.ensure_mutable()?;
        let applied = self.wagering.add(credit);
        let started = applied > 0 && self.status == BonusStatus::Active;
        if started {
            self.transition(BonusStatus::Wagering)?;
        }
        Ok((applied, started))
    }

    /// Consume one free bet token.
    pub fn use_free_bet(&mut self, now: DateTime<Utc>) -> LedgerResult<u32> {
        self.ensure_mutable()?;
        if now > self.expires_at {
            return Err(LedgerError::FreeBetsExpired(self.id));
        }
        let balance = self
            .free_bets
            .as_mut()
            .filter(|b| b.remaining > 0)
            .ok_or(LedgerError::NoFreeBetsRemaining(self.id))?;
        balance.used += 1;
        balance.remaining -= 1;
        Ok(balance.remaining)
    }

    /// Take up to `amount` from the bonus balance. Returns what was taken.
    pub fn debit_funds(&mut self, amount: i64) -> LedgerResult<i64> {
        self.ensure_mutable()?;
        let taken = amount.clamp(0, self.bonus_remaining);
        self.bonus_remaining -= taken;
        Ok(taken)
    }

    /// Finalise a terminal transition. The whole remaining balance leaves
    /// the bonus (converted or forfeited) and the record freezes.
    pub fn commit_terminal(&mut self, kind: TransitionKind) -> LedgerResult<i64> {
        self.transition(kind.target_status())?;
        let moved = self.bonus_remaining;
        self.bonus_remaining = 0;
        self.settled_amount = moved;
        self.pending_transition = None;
        Ok(moved)
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.pending_transition
            .as_ref()
            .is_some_and(|p| p.attempts > 0)
    }
}

/// Ledger entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Credit,
    Debit,
    Conversion,
    Forfeiture,
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEntryType::Credit => write!(f, "credit"),
            LedgerEntryType::Debit => write!(f, "debit"),
            LedgerEntryType::Conversion => write!(f, "conversion"),
            LedgerEntryType::Forfeiture => write!(f, "forfeiture"),
        }
    }
}

impl FromStr for LedgerEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(LedgerEntryType::Credit),
            "debit" => Ok(LedgerEntryType::Debit),
            "conversion" => Ok(LedgerEntryType::Conversion),
            "forfeiture" => Ok(LedgerEntryType::Forfeiture),
            other => Err(format!("unknown ledger entry type '{other}'")),
        }
    }
}

/// Append-only movement of a bonus balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub bonus_id: BonusId,
    pub player_id: PlayerId,
    pub entry_type: LedgerEntryType,
    pub amount: i64,
    pub resulting_balance: i64,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
}

impl LedgerEntry {
    pub fn new(
        bonus: &PlayerBonus,
        entry_type: LedgerEntryType,
        amount: i64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bonus_id: bonus.id,
            player_id: bonus.player_id,
            entry_type,
            amount,
            resulting_balance: bonus.bonus_remaining,
            timestamp: now,
            note,
        }
    }
}

/// Player bonus listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BonusFilter {
    pub player_id: Option<PlayerId>,
    pub status: Option<BonusStatus>,
    pub bonus_type: Option<BonusType>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl BonusFilter {
    pub fn matches(&self, bonus: &PlayerBonus) -> bool {
        self.player_id.is_none_or(|p| p == bonus.player_id)
            && self.status.is_none_or(|s| s == bonus.status)
            && self.bonus_type.is_none_or(|t| t == bonus.bonus_type())
    }
}
