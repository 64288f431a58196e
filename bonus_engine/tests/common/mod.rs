//! Shared fixtures for the engine integration tests.
//!
//! Everything runs against `MemoryStore`, `MemoryWallet` and a
//! `ManualClock`, so no database is needed.

#![allow(dead_code)]

use bonus_engine::{
    cashback::{CashbackLevel, CashbackTierEngine, LevelBenefits, PeriodCaps, VerticalRates},
    catalog::{
        BonusKind, BonusMoney, BonusTemplate, Category, DepositMatch, Eligibility, NewTemplate,
        TemplateCatalog, TemplateStatus, Validity, ValueTerms, WageringTerms,
    },
    clock::{Clock, ManualClock},
    db::{BonusRepository, CashbackLevelRepository, MemoryStore, TemplateRepository},
    ledger::{PlayerBonus, PlayerId},
    lifecycle::{BonusOrchestrator, BonusResult, ClaimRequest},
    wagering::{BetOutcome, BetSettlement, Vertical},
    wallet::{MemoryWallet, RetryPolicy, WalletService},
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub wallet: Arc<MemoryWallet>,
    pub clock: Arc<ManualClock>,
    pub catalog: TemplateCatalog,
    pub cashback: Arc<CashbackTierEngine>,
    pub orchestrator: Arc<BonusOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::immediate(2))
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let wallet = Arc::new(MemoryWallet::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));

        let templates: Arc<dyn TemplateRepository> = store.clone();
        let bonuses: Arc<dyn BonusRepository> = store.clone();
        let levels: Arc<dyn CashbackLevelRepository> = store.clone();
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let dyn_wallet: Arc<dyn WalletService> = wallet.clone();

        let catalog = TemplateCatalog::new(templates.clone(), bonuses.clone(), dyn_clock.clone());
        let cashback = Arc::new(CashbackTierEngine::new(
            levels,
            bonuses.clone(),
            dyn_clock.clone(),
        ));
        let orchestrator = Arc::new(
            BonusOrchestrator::new(
                templates,
                bonuses,
                cashback.clone(),
                dyn_wallet,
                dyn_clock,
                retry,
            )
            .with_template_locks(catalog.template_locks()),
        );

        Self {
            store,
            wallet,
            clock,
            catalog,
            cashback,
            orchestrator,
        }
    }

    /// Create a template and publish it
    pub async fn publish(&self, new: NewTemplate) -> BonusTemplate {
        let template = self.catalog.create(new).await.unwrap();
        self.catalog
            .set_status(template.id, TemplateStatus::Active)
            .await
            .unwrap()
    }

    pub async fn claim(
        &self,
        player_id: PlayerId,
        template: &BonusTemplate,
        deposit: Option<i64>,
    ) -> BonusResult<PlayerBonus> {
        self.orchestrator
            .claim(ClaimRequest {
                player_id,
                template_id: template.id,
                deposit_amount: deposit,
                channel: Category::All,
                actor: "player".to_string(),
            })
            .await
    }

    /// Lost single sports bet settled now
    pub fn bet(&self, bet_id: &str, player_id: PlayerId, stake: i64, odds: f64) -> BetSettlement {
        BetSettlement {
            bet_id: bet_id.to_string(),
            player_id,
            stake,
            total_odds: odds,
            legs: Vec::new(),
            outcome: BetOutcome::Lost,
            vertical: Vertical::Sports,
            payout: 0,
            settled_at: self.clock.now(),
            funded_by: None,
            free_bet: false,
            bonus_funds_used: 0,
        }
    }

    pub async fn reload(&self, bonus: &PlayerBonus) -> PlayerBonus {
        self.orchestrator.get_bonus(bonus.id).await.unwrap()
    }
}

fn template(name: &str, kind: BonusKind, value: ValueTerms, multiplier: f64, min_odds: f64) -> NewTemplate {
    NewTemplate {
        name: name.to_string(),
        description: None,
        kind,
        category: Category::All,
        value,
        wagering: WageringTerms {
            multiplier,
            min_odds,
        },
        validity: Validity {
            days_to_expire: 30,
            days_to_wager: 30,
        },
        eligibility: Eligibility::default(),
    }
}

/// 100% deposit match up to 500, 10x rollover at 1.5 minimum odds
pub fn welcome100() -> NewTemplate {
    template(
        "WELCOME100",
        BonusKind::DepositMatch(DepositMatch {}),
        ValueTerms {
            amount: 100,
            max_amount: Some(500),
            min_deposit: None,
        },
        10.0,
        1.5,
    )
}

/// Fixed bonus money with the given rollover
pub fn bonus_money(name: &str, amount: i64, multiplier: f64) -> NewTemplate {
    template(
        name,
        BonusKind::BonusMoney(BonusMoney {}),
        ValueTerms {
            amount,
            max_amount: None,
            min_deposit: None,
        },
        multiplier,
        1.5,
    )
}

pub fn level(tier: u32, name: &str, min_monthly_wager: i64, sports_bps: u32) -> CashbackLevel {
    CashbackLevel {
        tier,
        name: name.to_string(),
        min_monthly_wager,
        rates: VerticalRates {
            sports: sports_bps,
            casino: sports_bps,
            live_casino: sports_bps,
            virtual_sports: sports_bps,
        },
        caps: PeriodCaps::default(),
        benefits: LevelBenefits::default(),
    }
}
