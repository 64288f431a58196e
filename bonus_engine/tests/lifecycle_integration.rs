//! Integration tests for the bonus lifecycle.
//!
//! Covers claims, wagering progress, completion, expiry, cancellation and
//! recovery from wallet failures.

mod common;

use bonus_engine::{
    catalog::{
        BonusKind, Category, ComboBoost, Eligibility, FreeBet, TemplateStatus, ValueTerms,
    },
    ledger::{BonusStatus, HistoryAction, LedgerEntryType, TransitionKind},
    lifecycle::{BonusError, BoostPayout, ClaimRequest},
    sweeper::{ExpirySweeper, SweeperConfig},
    wagering::{BetLeg, BetOutcome, Vertical},
    wallet::{WalletReason, WalletService},
};
use chrono::Duration;
use common::{Harness, bonus_money, level, welcome100};
use std::sync::Arc;

const PLAYER: i64 = 1;

#[tokio::test]
async fn test_welcome_bonus_completes_and_converts() {
    let h = Harness::new();
    let template = h.publish(welcome100()).await;

    let bonus = h.claim(PLAYER, &template, Some(200)).await.unwrap();
    assert_eq!(bonus.status, BonusStatus::Active);
    assert_eq!(bonus.bonus_amount, 200);
    assert_eq!(bonus.bonus_remaining, 200);
    assert_eq!(bonus.wagering.requirement, 2000);

    let report = h
        .orchestrator
        .record_bet_settlement(h.bet("bet-1", PLAYER, 2000, 1.8))
        .await
        .unwrap();
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].credited, 2000);
    assert_eq!(report.completed, vec![bonus.id]);

    let bonus = h.reload(&bonus).await;
    assert_eq!(bonus.status, BonusStatus::Completed);
    assert_eq!(bonus.wagering.completed, 2000);
    assert_eq!(bonus.wagering.progress_pct, 100.0);
    assert_eq!(bonus.bonus_remaining, 0);
    assert_eq!(bonus.settled_amount, 200);

    assert_eq!(h.wallet.withdrawable(PLAYER), 200);
    let journal = h.wallet.journal();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].idempotency_key, format!("{}:completed", bonus.id));

    let (_, entries) = h.orchestrator.bonus_with_entries(bonus.id).await.unwrap();
    let types: Vec<_> = entries.iter().map(|e| e.entry_type).collect();
    assert_eq!(types, vec![LedgerEntryType::Credit, LedgerEntryType::Conversion]);
    assert_eq!(entries[1].amount, 200);
    assert_eq!(entries[1].resulting_balance, 0);
}

#[tokio::test]
async fn test_bet_below_min_odds_does_not_count() {
    let h = Harness::new();
    let template = h.publish(welcome100()).await;
    let bonus = h.claim(PLAYER, &template, Some(200)).await.unwrap();

    let report = h
        .orchestrator
        .record_bet_settlement(h.bet("bet-low", PLAYER, 2000, 1.2))
        .await
        .unwrap();
    assert_eq!(report.updates[0].credited, 0);
    assert!(report.completed.is_empty());

    let bonus = h.reload(&bonus).await;
    assert_eq!(bonus.wagering.completed, 0);
    assert_eq!(bonus.status, BonusStatus::Active);
    assert!(h.wallet.journal().is_empty());
}

#[tokio::test]
async fn test_first_qualifying_bet_starts_wagering() {
    let h = Harness::new();
    let template = h.publish(welcome100()).await;
    let bonus = h.claim(PLAYER, &template, Some(200)).await.unwrap();

    h.orchestrator
        .record_bet_settlement(h.bet("bet-1", PLAYER, 500, 2.0))
        .await
        .unwrap();

    let bonus = h.reload(&bonus).await;
    assert_eq!(bonus.status, BonusStatus::Wagering);
    assert_eq!(bonus.wagering.completed, 500);
    assert_eq!(bonus.wagering.progress_pct, 25.0);
    assert!(
        bonus
            .history
            .iter()
            .any(|e| e.action == HistoryAction::WageringStarted)
    );
}

#[tokio::test]
async fn test_replayed_settlement_is_a_no_op() {
    let h = Harness::new();
    let template = h.publish(welcome100()).await;
    let bonus = h.claim(PLAYER, &template, Some(200)).await.unwrap();
    let bet = h.bet("bet-dup", PLAYER, 700, 2.0);

    let first = h.orchestrator.record_bet_settlement(bet.clone()).await.unwrap();
    assert!(first.newly_recorded);
    let after_first = h.reload(&bonus).await;

    let second = h.orchestrator.record_bet_settlement(bet).await.unwrap();
    assert!(!second.newly_recorded);
    assert!(second.updates.is_empty());
    assert_eq!(second.replayed, vec![bonus.id]);

    let after_second = h.reload(&bonus).await;
    assert_eq!(after_second.wagering.completed, 700);
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn test_expiry_sweep_forfeits_and_is_idempotent() {
    let h = Harness::new();
    let template = h.publish(bonus_money("FIFTY", 50, 10.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    h.orchestrator
        .record_bet_settlement(h.bet("bet-1", PLAYER, 100, 2.0))
        .await
        .unwrap();
    assert_eq!(h.reload(&bonus).await.status, BonusStatus::Wagering);

    h.clock.advance(Duration::days(31));
    let sweeper = ExpirySweeper::new(h.orchestrator.clone(), SweeperConfig::default());

    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.expired, 1);

    let expired = h.reload(&bonus).await;
    assert_eq!(expired.status, BonusStatus::Expired);
    assert_eq!(expired.bonus_remaining, 0);
    assert_eq!(expired.settled_amount, 50);
    assert_eq!(h.wallet.forfeited(PLAYER), 50);
    assert_eq!(h.wallet.withdrawable(PLAYER), 0);

    let again = sweeper.sweep_once().await.unwrap();
    assert_eq!(again.scanned, 0);
    assert_eq!(again.expired, 0);
    assert_eq!(h.reload(&bonus).await, expired);
    assert_eq!(h.wallet.journal().len(), 1);

    // frozen afterwards
    let late = h
        .orchestrator
        .record_bet_settlement(h.bet("bet-late", PLAYER, 1000, 2.0))
        .await
        .unwrap();
    assert!(late.updates.is_empty());
    let err = h
        .orchestrator
        .cancel(bonus.id, "too late", "admin")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BonusError::InvalidTransition {
            from: BonusStatus::Expired,
            to: BonusStatus::Cancelled,
            ..
        }
    ));
    assert_eq!(h.reload(&bonus).await, expired);
}

#[tokio::test]
async fn test_expire_skips_bonus_not_yet_due() {
    let h = Harness::new();
    let template = h.publish(bonus_money("EARLY", 100, 5.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    let outcome = h.orchestrator.expire(bonus.id).await.unwrap();
    assert!(matches!(outcome, bonus_engine::lifecycle::ExpireOutcome::Skipped(_)));
    assert_eq!(h.reload(&bonus).await.status, BonusStatus::Active);
}

#[tokio::test]
async fn test_bet_settled_after_deadline_earns_nothing() {
    let h = Harness::new();
    let template = h.publish(bonus_money("LATE", 100, 5.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    h.clock.advance(Duration::days(31));
    let report = h
        .orchestrator
        .record_bet_settlement(h.bet("bet-late", PLAYER, 500, 2.0))
        .await
        .unwrap();
    assert_eq!(report.updates[0].credited, 0);
    assert_eq!(h.reload(&bonus).await.wagering.completed, 0);
}

#[tokio::test]
async fn test_wallet_failure_flags_bonus_and_reconcile_completes_once() {
    let h = Harness::new();
    let template = h.publish(bonus_money("FLAKY", 100, 1.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    h.wallet.fail_next(10);
    let report = h
        .orchestrator
        .record_bet_settlement(h.bet("bet-1", PLAYER, 100, 2.0))
        .await
        .unwrap();
    assert!(report.completed.is_empty());
    assert_eq!(report.failed.len(), 1);

    let flagged = h.reload(&bonus).await;
    assert_eq!(flagged.status, BonusStatus::Wagering);
    assert_eq!(flagged.bonus_remaining, 100);
    assert!(flagged.needs_reconciliation());
    let pending = flagged.pending_transition.clone().unwrap();
    assert_eq!(pending.target, TransitionKind::Completed);
    assert_eq!(pending.attempts, 1);
    assert!(pending.last_error.is_some());
    assert!(h.wallet.journal().is_empty());

    // no other mutation while the transition is reserved
    let blocked = h
        .orchestrator
        .record_bet_settlement(h.bet("bet-2", PLAYER, 100, 2.0))
        .await
        .unwrap();
    assert!(blocked.updates.is_empty());
    let err = h
        .orchestrator
        .cancel(bonus.id, "abuse", "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, BonusError::TransitionInProgress { .. }));

    let still_down = h.orchestrator.reconcile_pending(10).await.unwrap();
    assert_eq!(still_down.attempted, 1);
    assert_eq!(still_down.failed, 1);
    assert_eq!(
        h.reload(&bonus).await.pending_transition.unwrap().attempts,
        2
    );

    // wallet recovers after having applied the credit without answering
    h.wallet.fail_next(0);
    h.wallet
        .credit(
            PLAYER,
            100,
            &WalletReason::BonusConversion { bonus_id: bonus.id },
            &bonus.idempotency_key(TransitionKind::Completed),
        )
        .await
        .unwrap();

    let completed = h.orchestrator.reconcile(bonus.id).await.unwrap();
    assert_eq!(completed.status, BonusStatus::Completed);
    assert!(completed.pending_transition.is_none());
    assert_eq!(h.wallet.withdrawable(PLAYER), 100);
    assert_eq!(h.wallet.journal().len(), 1);

    let again = h.orchestrator.reconcile(bonus.id).await.unwrap();
    assert_eq!(again, completed);
    assert_eq!(h.wallet.journal().len(), 1);
}

#[tokio::test]
async fn test_cancel_requires_reason_and_forfeits() {
    let h = Harness::new();
    let template = h.publish(bonus_money("CANCEL", 100, 5.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    let err = h
        .orchestrator
        .cancel(bonus.id, "   ", "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, BonusError::Validation(_)));

    let cancelled = h
        .orchestrator
        .cancel(bonus.id, "bonus abuse", "admin")
        .await
        .unwrap();
    assert_eq!(cancelled.status, BonusStatus::Cancelled);
    assert_eq!(cancelled.bonus_remaining, 0);
    assert_eq!(h.wallet.forfeited(PLAYER), 100);
    assert_eq!(h.wallet.withdrawable(PLAYER), 0);

    let last = cancelled.history.last().unwrap();
    assert_eq!(last.action, HistoryAction::Cancelled);
    assert_eq!(last.actor, "admin");
    assert_eq!(last.note.as_deref(), Some("bonus abuse"));

    let (_, entries) = h.orchestrator.bonus_with_entries(bonus.id).await.unwrap();
    assert_eq!(entries.last().unwrap().entry_type, LedgerEntryType::Forfeiture);

    let err = h
        .orchestrator
        .forfeit(bonus.id, "odds policy", "risk")
        .await
        .unwrap_err();
    assert!(matches!(err, BonusError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_forfeit_behaves_like_cancel() {
    let h = Harness::new();
    let template = h.publish(bonus_money("RISK", 80, 5.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    let forfeited = h
        .orchestrator
        .forfeit(bonus.id, "min odds breached across ticket", "risk")
        .await
        .unwrap();
    assert_eq!(forfeited.status, BonusStatus::Forfeited);
    assert_eq!(h.wallet.forfeited(PLAYER), 80);
    assert_eq!(
        h.wallet.journal()[0].idempotency_key,
        format!("{}:forfeited", bonus.id)
    );
}

#[tokio::test]
async fn test_duplicate_claim_rejected_unless_repeats_allowed() {
    let h = Harness::new();
    let template = h.publish(bonus_money("ONCE", 100, 5.0)).await;
    let first = h.claim(PLAYER, &template, None).await.unwrap();

    let err = h.claim(PLAYER, &template, None).await.unwrap_err();
    match err {
        BonusError::AlreadyClaimed { existing, status } => {
            assert_eq!(existing, first.id);
            assert_eq!(status, BonusStatus::Active);
        }
        other => panic!("expected AlreadyClaimed, got {other:?}"),
    }

    // another player is unaffected
    assert!(h.claim(2, &template, None).await.is_ok());

    let mut repeatable = bonus_money("DAILY", 10, 5.0);
    repeatable.eligibility = Eligibility {
        min_tier: None,
        allow_repeat: true,
    };
    let repeatable = h.publish(repeatable).await;
    assert!(h.claim(PLAYER, &repeatable, None).await.is_ok());
    assert!(h.claim(PLAYER, &repeatable, None).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_claims_create_one_bonus() {
    let h = Harness::new();
    let template = h.publish(bonus_money("RACE", 100, 5.0)).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let orchestrator = h.orchestrator.clone();
        let template_id = template.id;
        handles.push(tokio::spawn(async move {
            orchestrator
                .claim(ClaimRequest {
                    player_id: PLAYER,
                    template_id,
                    deposit_amount: None,
                    channel: Category::All,
                    actor: "player".to_string(),
                })
                .await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn test_zero_rollover_completes_on_claim() {
    let h = Harness::new();
    let template = h.publish(bonus_money("INSTANT", 25, 0.0)).await;

    let bonus = h.claim(PLAYER, &template, None).await.unwrap();
    assert_eq!(bonus.status, BonusStatus::Completed);
    assert_eq!(h.wallet.withdrawable(PLAYER), 25);

    // completed bonuses no longer block a new claim
    let again = h.claim(PLAYER, &template, None).await.unwrap();
    assert_eq!(again.status, BonusStatus::Completed);
    assert_eq!(h.wallet.withdrawable(PLAYER), 50);
}

#[tokio::test]
async fn test_inactive_template_rejects_claims() {
    let h = Harness::new();
    let draft = h.catalog.create(bonus_money("DRAFT", 100, 5.0)).await.unwrap();
    let err = h.claim(PLAYER, &draft, None).await.unwrap_err();
    assert!(matches!(
        err,
        BonusError::TemplateInactive {
            status: TemplateStatus::Draft,
            ..
        }
    ));

    let live = h.publish(bonus_money("PAUSE", 100, 5.0)).await;
    let bonus = h.claim(PLAYER, &live, None).await.unwrap();
    h.catalog
        .set_status(live.id, TemplateStatus::Paused)
        .await
        .unwrap();

    let err = h.claim(2, &live, None).await.unwrap_err();
    assert!(matches!(
        err,
        BonusError::TemplateInactive {
            status: TemplateStatus::Paused,
            ..
        }
    ));

    // the claimed bonus keeps working
    h.orchestrator
        .record_bet_settlement(h.bet("bet-1", PLAYER, 200, 2.0))
        .await
        .unwrap();
    assert_eq!(h.reload(&bonus).await.wagering.completed, 200);
}

#[tokio::test]
async fn test_deposit_requirements() {
    let h = Harness::new();
    let mut new = welcome100();
    new.value.min_deposit = Some(20);
    let template = h.publish(new).await;

    let err = h.claim(PLAYER, &template, Some(10)).await.unwrap_err();
    assert!(matches!(err, BonusError::EligibilityNotMet(_)));
    let err = h.claim(PLAYER, &template, None).await.unwrap_err();
    assert!(matches!(err, BonusError::EligibilityNotMet(_)));

    let bonus = h.claim(PLAYER, &template, Some(900)).await.unwrap();
    assert_eq!(bonus.bonus_amount, 500);
    assert_eq!(bonus.wagering.requirement, 5000);
}

#[tokio::test]
async fn test_channel_must_match_category() {
    let h = Harness::new();
    let mut new = bonus_money("SPORTS", 100, 5.0);
    new.category = Category::Sports;
    let template = h.publish(new).await;

    let request = |channel| ClaimRequest {
        player_id: PLAYER,
        template_id: template.id,
        deposit_amount: None,
        channel,
        actor: "player".to_string(),
    };
    let err = h
        .orchestrator
        .claim(request(Category::Casino))
        .await
        .unwrap_err();
    assert!(matches!(err, BonusError::EligibilityNotMet(_)));
    assert!(h.orchestrator.claim(request(Category::Sports)).await.is_ok());
}

#[tokio::test]
async fn test_min_tier_uses_trailing_wager() {
    let h = Harness::new();
    let mut new = bonus_money("VIP", 100, 5.0);
    new.eligibility.min_tier = Some(2);
    let template = h.publish(new).await;

    let err = h.claim(PLAYER, &template, None).await.unwrap_err();
    assert!(matches!(err, BonusError::EligibilityNotMet(_)));

    h.cashback.create_level(level(1, "Bronze", 0, 100)).await.unwrap();
    h.cashback
        .create_level(level(2, "Silver", 10_000, 200))
        .await
        .unwrap();

    let err = h.claim(PLAYER, &template, None).await.unwrap_err();
    assert!(matches!(err, BonusError::EligibilityNotMet(_)));

    for i in 0..4 {
        h.orchestrator
            .record_bet_settlement(h.bet(&format!("vol-{i}"), PLAYER, 2500, 2.0))
            .await
            .unwrap();
    }
    assert!(h.claim(PLAYER, &template, None).await.is_ok());
}

#[tokio::test]
async fn test_cashback_bonus_sized_from_net_loss() {
    let h = Harness::new();
    let mut new = bonus_money("CASHBACK", 0, 1.0);
    new.kind = BonusKind::Cashback(bonus_engine::catalog::Cashback {
        percentage: 10,
        max_amount: Some(1_000),
        period: bonus_engine::cashback::CashbackPeriod::Week,
    });
    let template = h.publish(new).await;

    let err = h.claim(PLAYER, &template, None).await.unwrap_err();
    assert!(matches!(err, BonusError::EligibilityNotMet(_)));

    h.orchestrator
        .record_bet_settlement(h.bet("loss-1", PLAYER, 3000, 2.0))
        .await
        .unwrap();
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();
    assert_eq!(bonus.bonus_amount, 300);
}

#[tokio::test]
async fn test_free_bet_ticket_consumes_token_without_wagering() {
    let h = Harness::new();
    let mut new = bonus_money("FREEBET", 0, 1.0);
    new.kind = BonusKind::FreeBet(FreeBet {
        count: 2,
        amount_per_bet: 500,
        min_odds: 1.5,
    });
    let template = h.publish(new).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();
    assert_eq!(bonus.bonus_amount, 1000);
    assert_eq!(bonus.free_bets.as_ref().unwrap().remaining, 2);

    let mut bet = h.bet("fb-1", PLAYER, 500, 2.0);
    bet.funded_by = Some(bonus.id);
    bet.free_bet = true;
    h.orchestrator.record_bet_settlement(bet).await.unwrap();

    let bonus = h.reload(&bonus).await;
    let free_bets = bonus.free_bets.unwrap();
    assert_eq!(free_bets.used, 1);
    assert_eq!(free_bets.remaining, 1);
    assert_eq!(bonus.wagering.completed, 0);
    assert_eq!(bonus.status, BonusStatus::Active);
}

#[tokio::test]
async fn test_bonus_funded_stake_is_debited() {
    let h = Harness::new();
    let template = h.publish(bonus_money("FUNDS", 1000, 5.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    let mut bet = h.bet("funded-1", PLAYER, 300, 2.0);
    bet.funded_by = Some(bonus.id);
    bet.bonus_funds_used = 300;
    h.orchestrator.record_bet_settlement(bet).await.unwrap();

    let (bonus, entries) = h.orchestrator.bonus_with_entries(bonus.id).await.unwrap();
    assert_eq!(bonus.bonus_remaining, 700);
    assert_eq!(bonus.wagering.completed, 300);
    let debit = entries.last().unwrap();
    assert_eq!(debit.entry_type, LedgerEntryType::Debit);
    assert_eq!(debit.amount, 300);
    assert_eq!(debit.resulting_balance, 700);
}

#[tokio::test]
async fn test_combo_boost_draws_from_budget() {
    let h = Harness::new();
    let mut new = bonus_money("COMBO", 1000, 10.0);
    new.kind = BonusKind::ComboBoost(ComboBoost {
        min_legs: 3,
        boost_per_leg_pct: 5,
        max_boost_pct: 20,
    });
    new.value = ValueTerms {
        amount: 1000,
        max_amount: None,
        min_deposit: None,
    };
    let template = h.publish(new).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    let mut bet = h.bet("combo-1", PLAYER, 100, 0.0);
    bet.legs = (0..4)
        .map(|_| BetLeg {
            selection: None,
            odds: 1.5,
        })
        .collect();
    bet.total_odds = 5.0625;
    bet.outcome = BetOutcome::Won;
    bet.payout = 506;

    let report = h.orchestrator.record_bet_settlement(bet).await.unwrap();
    assert_eq!(
        report.boosts,
        vec![BoostPayout {
            bonus_id: bonus.id,
            amount: 40
        }]
    );

    let bonus = h.reload(&bonus).await;
    assert_eq!(bonus.bonus_remaining, 960);
    assert_eq!(bonus.wagering.completed, 100);
}

#[tokio::test]
async fn test_bet_outside_category_earns_nothing() {
    let h = Harness::new();
    let mut new = bonus_money("CASINO", 100, 5.0);
    new.category = Category::Casino;
    let template = h.publish(new).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    h.orchestrator
        .record_bet_settlement(h.bet("sports-1", PLAYER, 300, 2.0))
        .await
        .unwrap();
    let mut live = h.bet("live-1", PLAYER, 200, 2.0);
    live.vertical = Vertical::LiveCasino;
    h.orchestrator.record_bet_settlement(live).await.unwrap();

    assert_eq!(h.reload(&bonus).await.wagering.completed, 200);
}

#[tokio::test]
async fn test_empty_bet_id_rejected() {
    let h = Harness::new();
    let err = h
        .orchestrator
        .record_bet_settlement(h.bet("  ", PLAYER, 100, 2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BonusError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bets_complete_exactly_once() {
    let h = Harness::new();
    let template = h.publish(bonus_money("RUSH", 1000, 5.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let orchestrator = h.orchestrator.clone();
        let bet = h.bet(&format!("rush-{i}"), PLAYER, 1000, 2.0);
        handles.push(tokio::spawn(async move {
            orchestrator.record_bet_settlement(bet).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let bonus = h.reload(&bonus).await;
    assert_eq!(bonus.status, BonusStatus::Completed);
    assert_eq!(bonus.wagering.completed, 5000);
    assert_eq!(h.wallet.journal().len(), 1);
    assert_eq!(h.wallet.withdrawable(PLAYER), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_racing_settlements_moves_money_once() {
    let h = Arc::new(Harness::new());
    let template = h.publish(bonus_money("RACE", 1000, 100.0)).await;
    let bonus = h.claim(PLAYER, &template, None).await.unwrap();

    let bets: Vec<_> = (0..30)
        .map(|i| h.bet(&format!("race-{i}"), PLAYER, 1000, 2.0))
        .collect();
    h.clock.advance(Duration::days(31));

    let mut handles = Vec::new();
    for bet in bets {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.record_bet_settlement(bet).await.map(|_| ())
        }));
    }
    let orchestrator = h.orchestrator.clone();
    let bonus_id = bonus.id;
    let sweep = tokio::spawn(async move { orchestrator.expire(bonus_id).await.map(|_| ()) });

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    sweep.await.unwrap().unwrap();

    let bonus = h.reload(&bonus).await;
    assert_eq!(bonus.status, BonusStatus::Expired);
    assert_eq!(
        bonus.wagering.completed,
        1000 * bonus.processed_bets.len() as i64
    );
    assert_eq!(h.wallet.journal().len(), 1);
    assert_eq!(h.wallet.forfeited(PLAYER), 1000);
}

#[tokio::test]
async fn test_stats_reflect_ledger() {
    let h = Harness::new();
    let template = h.publish(bonus_money("STATS", 100, 1.0)).await;
    h.claim(PLAYER, &template, None).await.unwrap();
    let other = h.claim(2, &template, None).await.unwrap();

    h.orchestrator
        .record_bet_settlement(h.bet("s-1", PLAYER, 100, 2.0))
        .await
        .unwrap();
    h.orchestrator
        .cancel(other.id, "duplicate account", "admin")
        .await
        .unwrap();

    let stats = h.orchestrator.stats().await.unwrap();
    assert_eq!(stats.total_claimed, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.total_converted, 100);
    assert_eq!(stats.total_forfeited, 100);
}
