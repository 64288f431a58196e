//! Bonus template data models.

use chrono::{DateTime, Utc};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use crate::{cashback::CashbackPeriod, wagering::Vertical};

/// Template ID type
pub type TemplateId = Uuid;

/// Which part of the product a template applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    All,
    Sports,
    Casino,
}

impl Category {
    /// Whether a bet placed in `vertical` counts for this category.
    ///
    /// Sports covers virtual sports, casino covers live casino.
    pub fn covers(self, vertical: Vertical) -> bool {
        match self {
            Category::All => true,
            Category::Sports => matches!(vertical, Vertical::Sports | Vertical::VirtualSports),
            Category::Casino => matches!(vertical, Vertical::Casino | Vertical::LiveCasino),
        }
    }

    /// Whether a claim made from `channel` may use a template of this category.
    pub fn accepts_channel(self, channel: Category) -> bool {
        self == Category::All || channel == Category::All || self == channel
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::All => write!(f, "all"),
            Category::Sports => write!(f, "sports"),
            Category::Casino => write!(f, "casino"),
        }
    }
}

/// Lifecycle status of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Draft,
    Active,
    Paused,
}

impl fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateStatus::Draft => write!(f, "draft"),
            TemplateStatus::Active => write!(f, "active"),
            TemplateStatus::Paused => write!(f, "paused"),
        }
    }
}

impl FromStr for TemplateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TemplateStatus::Draft),
            "active" => Ok(TemplateStatus::Active),
            "paused" => Ok(TemplateStatus::Paused),
            other => Err(format!("unknown template status '{other}'")),
        }
    }
}

/// Discriminant of [`BonusKind`], used for filtering and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusType {
    DepositMatch,
    FreeBet,
    FreeSpins,
    BonusMoney,
    Cashback,
    ComboBoost,
    ReloadBonus,
    NoDeposit,
    Referral,
    Loyalty,
}

impl BonusType {
    pub const ALL: [BonusType; 10] = [
        BonusType::DepositMatch,
        BonusType::FreeBet,
        BonusType::FreeSpins,
        BonusType::BonusMoney,
        BonusType::Cashback,
        BonusType::ComboBoost,
        BonusType::ReloadBonus,
        BonusType::NoDeposit,
        BonusType::Referral,
        BonusType::Loyalty,
    ];
}

impl fmt::Display for BonusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BonusType::DepositMatch => "deposit_match",
            BonusType::FreeBet => "free_bet",
            BonusType::FreeSpins => "free_spins",
            BonusType::BonusMoney => "bonus_money",
            BonusType::Cashback => "cashback",
            BonusType::ComboBoost => "combo_boost",
            BonusType::ReloadBonus => "reload_bonus",
            BonusType::NoDeposit => "no_deposit",
            BonusType::Referral => "referral",
            BonusType::Loyalty => "loyalty",
        };
        write!(f, "{name}")
    }
}

impl FromStr for BonusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BonusType::ALL
            .into_iter()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| format!("unknown bonus type '{s}'"))
    }
}

/// Monetary terms shared by every template.
///
/// For deposit-relative kinds (`deposit_match`, `reload_bonus`) `amount` is
/// the match percentage; for every other kind it is a fixed amount in minor
/// units. `max_amount` always caps the granted money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTerms {
    pub amount: i64,
    #[serde(default)]
    pub max_amount: Option<i64>,
    #[serde(default)]
    pub min_deposit: Option<i64>,
}

impl ValueTerms {
    fn capped(&self, amount: i64) -> i64 {
        match self.max_amount {
            Some(max) => amount.min(max),
            None => amount,
        }
    }
}

/// Rollover terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WageringTerms {
    /// Requirement = bonus amount x multiplier
    pub multiplier: f64,
    /// Minimum effective odds for a bet to count
    pub min_odds: f64,
}

/// Validity windows, counted from the claim instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub days_to_expire: u32,
    pub days_to_wager: u32,
}

/// Who may claim a template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    /// Minimum cashback tier, if restricted
    #[serde(default)]
    pub min_tier: Option<u32>,
    /// Allow several open bonuses of this template per player
    #[serde(default)]
    pub allow_repeat: bool,
}

/// Inputs a claim is evaluated against
#[derive(Debug, Clone, Default)]
pub struct GrantContext {
    pub deposit_amount: Option<i64>,
    /// Net loss over the cashback period (cashback templates only)
    pub net_loss: Option<i64>,
}

/// What a successful claim hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub amount: i64,
    pub free_bets: Option<u32>,
}

/// Per-variant payout rule.
///
/// `Err` carries the human-readable reason the claim is not eligible.
#[enum_dispatch]
pub trait PayoutRule {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String>;

    fn bonus_type(&self) -> BonusType;

    /// Sanity checks on the variant's own parameters
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

fn required_deposit(value: &ValueTerms, ctx: &GrantContext) -> Result<i64, String> {
    let deposit = ctx
        .deposit_amount
        .ok_or_else(|| "a qualifying deposit is required".to_string())?;
    if deposit <= 0 {
        return Err("a qualifying deposit is required".to_string());
    }
    if let Some(min) = value.min_deposit {
        if deposit < min {
            return Err(format!("minimum deposit of {min} required, got {deposit}"));
        }
    }
    Ok(deposit)
}

fn optional_deposit(value: &ValueTerms, ctx: &GrantContext) -> Result<(), String> {
    if value.min_deposit.is_some() {
        required_deposit(value, ctx)?;
    }
    Ok(())
}

fn fixed(value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
    optional_deposit(value, ctx)?;
    Ok(Grant {
        amount: value.capped(value.amount),
        free_bets: None,
    })
}

fn matched(value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
    let deposit = required_deposit(value, ctx)?;
    let raw = deposit.saturating_mul(value.amount) / 100;
    Ok(Grant {
        amount: value.capped(raw),
        free_bets: None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepositMatch {}

impl PayoutRule for DepositMatch {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        matched(value, ctx)
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::DepositMatch
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeBet {
    pub count: u32,
    pub amount_per_bet: i64,
    pub min_odds: f64,
}

impl PayoutRule for FreeBet {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        optional_deposit(value, ctx)?;
        let total = i64::from(self.count).saturating_mul(self.amount_per_bet);
        Ok(Grant {
            amount: value.capped(total),
            free_bets: Some(self.count),
        })
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::FreeBet
    }

    fn validate(&self) -> Result<(), String> {
        if self.count == 0 || self.amount_per_bet <= 0 {
            return Err("free bet count and amount must be positive".to_string());
        }
        if !self.min_odds.is_finite() || self.min_odds < 1.0 {
            return Err("free bet min odds must be at least 1.0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeSpins {
    pub count: u32,
    pub value_per_spin: i64,
}

impl PayoutRule for FreeSpins {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        optional_deposit(value, ctx)?;
        let total = i64::from(self.count).saturating_mul(self.value_per_spin);
        Ok(Grant {
            amount: value.capped(total),
            free_bets: Some(self.count),
        })
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::FreeSpins
    }

    fn validate(&self) -> Result<(), String> {
        if self.count == 0 || self.value_per_spin <= 0 {
            return Err("free spin count and value must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BonusMoney {}

impl PayoutRule for BonusMoney {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        fixed(value, ctx)
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::BonusMoney
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cashback {
    /// Share of the period's net loss refunded, in percent
    pub percentage: u32,
    #[serde(default)]
    pub max_amount: Option<i64>,
    pub period: CashbackPeriod,
}

impl PayoutRule for Cashback {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        let loss = ctx.net_loss.unwrap_or(0);
        if loss <= 0 {
            return Err(format!("no net loss over the last {}", self.period));
        }
        let mut amount = loss.saturating_mul(i64::from(self.percentage)) / 100;
        if let Some(max) = self.max_amount {
            amount = amount.min(max);
        }
        Ok(Grant {
            amount: value.capped(amount),
            free_bets: None,
        })
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::Cashback
    }

    fn validate(&self) -> Result<(), String> {
        if self.percentage == 0 || self.percentage > 100 {
            return Err("cashback percentage must be within 1..=100".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboBoost {
    pub min_legs: u32,
    /// Extra winnings per leg at or above `min_legs`, in percent
    pub boost_per_leg_pct: u32,
    pub max_boost_pct: u32,
}

impl PayoutRule for ComboBoost {
    /// The grant is the boost budget; boosts are drawn from it as combos win.
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        fixed(value, ctx)
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::ComboBoost
    }

    fn validate(&self) -> Result<(), String> {
        if self.min_legs < 2 {
            return Err("combo boost needs at least 2 legs".to_string());
        }
        if self.boost_per_leg_pct == 0 || self.max_boost_pct < self.boost_per_leg_pct {
            return Err("combo boost percentages are inconsistent".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReloadBonus {}

impl PayoutRule for ReloadBonus {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        matched(value, ctx)
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::ReloadBonus
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoDeposit {}

impl PayoutRule for NoDeposit {
    fn grant(&self, value: &ValueTerms, _ctx: &GrantContext) -> Result<Grant, String> {
        Ok(Grant {
            amount: value.capped(value.amount),
            free_bets: None,
        })
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::NoDeposit
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Referral {}

impl PayoutRule for Referral {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        fixed(value, ctx)
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::Referral
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loyalty {}

impl PayoutRule for Loyalty {
    fn grant(&self, value: &ValueTerms, ctx: &GrantContext) -> Result<Grant, String> {
        fixed(value, ctx)
    }

    fn bonus_type(&self) -> BonusType {
        BonusType::Loyalty
    }
}

/// The ten bonus variants, each with its own parameters.
#[enum_dispatch(PayoutRule)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BonusKind {
    DepositMatch(DepositMatch),
    FreeBet(FreeBet),
    FreeSpins(FreeSpins),
    BonusMoney(BonusMoney),
    Cashback(Cashback),
    ComboBoost(ComboBoost),
    ReloadBonus(ReloadBonus),
    NoDeposit(NoDeposit),
    Referral(Referral),
    Loyalty(Loyalty),
}

/// Terms copied into every claimed bonus. Later template edits never reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub kind: BonusKind,
    pub category: Category,
    pub value: ValueTerms,
    pub wagering: WageringTerms,
    pub validity: Validity,
    pub eligibility: Eligibility,
}

/// Bonus template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: Option<String>,
    pub kind: BonusKind,
    pub category: Category,
    pub value: ValueTerms,
    pub wagering: WageringTerms,
    pub validity: Validity,
    pub eligibility: Eligibility,
    pub status: TemplateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BonusTemplate {
    pub fn snapshot(&self) -> TemplateSnapshot {
        TemplateSnapshot {
            kind: self.kind.clone(),
            category: self.category,
            value: self.value.clone(),
            wagering: self.wagering.clone(),
            validity: self.validity.clone(),
            eligibility: self.eligibility.clone(),
        }
    }
}

/// Template creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: BonusKind,
    pub category: Category,
    pub value: ValueTerms,
    pub wagering: WageringTerms,
    pub validity: Validity,
    #[serde(default)]
    pub eligibility: Eligibility,
}

/// Partial template update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: Option<BonusKind>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub value: Option<ValueTerms>,
    #[serde(default)]
    pub wagering: Option<WageringTerms>,
    #[serde(default)]
    pub validity: Option<Validity>,
    #[serde(default)]
    pub eligibility: Option<Eligibility>,
}

impl TemplatePatch {
    /// True when no field is present
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.kind.is_none()
            && self.category.is_none()
            && self.value.is_none()
            && self.wagering.is_none()
            && self.validity.is_none()
            && self.eligibility.is_none()
    }

    /// Financial fields this patch would actually change on `current`.
    pub fn financial_changes(&self, current: &BonusTemplate) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.kind.as_ref().is_some_and(|k| *k != current.kind) {
            fields.push("kind");
        }
        if self.category.is_some_and(|c| c != current.category) {
            fields.push("category");
        }
        if self.value.as_ref().is_some_and(|v| *v != current.value) {
            fields.push("value");
        }
        if self.wagering.as_ref().is_some_and(|w| *w != current.wagering) {
            fields.push("wagering");
        }
        if self.validity.as_ref().is_some_and(|v| *v != current.validity) {
            fields.push("validity");
        }
        if self
            .eligibility
            .as_ref()
            .is_some_and(|e| *e != current.eligibility)
        {
            fields.push("eligibility");
        }
        fields
    }

    /// Apply every present field to `template`.
    pub fn apply(self, template: &mut BonusTemplate) {
        if let Some(name) = self.name {
            template.name = name;
        }
        if let Some(description) = self.description {
            template.description = Some(description);
        }
        if let Some(kind) = self.kind {
            template.kind = kind;
        }
        if let Some(category) = self.category {
            template.category = category;
        }
        if let Some(value) = self.value {
            template.value = value;
        }
        if let Some(wagering) = self.wagering {
            template.wagering = wagering;
        }
        if let Some(validity) = self.validity {
            template.validity = validity;
        }
        if let Some(eligibility) = self.eligibility {
            template.eligibility = eligibility;
        }
    }
}

/// Template listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateFilter {
    pub status: Option<TemplateStatus>,
    pub bonus_type: Option<BonusType>,
    pub category: Option<Category>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}
