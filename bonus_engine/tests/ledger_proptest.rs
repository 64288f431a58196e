/// Property-based tests for the bonus ledger invariants using proptest
///
/// These tests drive random bet sequences, funding draws and terminal
/// transitions through the engine and check that balances and wagering
/// progress always stay within bounds.
mod common;

use bonus_engine::{
    cashback::select_tier,
    catalog::{BonusKind, Category, DepositMatch, Eligibility, TemplateSnapshot, Validity},
    catalog::{ValueTerms, WageringTerms},
    ledger::{BonusStatus, PlayerBonus, WageringProgress},
    wagering::{BetLeg, BetOutcome, BetSettlement, Vertical, contribution},
};
use chrono::Utc;
use common::{Harness, bonus_money, level};
use proptest::prelude::*;

fn assert_invariants(bonus: &PlayerBonus) {
    assert!(bonus.bonus_remaining >= 0);
    assert!(bonus.bonus_remaining <= bonus.bonus_amount);
    assert!(bonus.wagering.completed >= 0);
    assert!(bonus.wagering.completed <= bonus.wagering.requirement);
    assert!(bonus.wagering.progress_pct <= 100.0);
    if let Some(free_bets) = &bonus.free_bets {
        assert!(free_bets.used <= free_bets.total);
        assert_eq!(free_bets.used + free_bets.remaining, free_bets.total);
    }
    if bonus.status.is_terminal() {
        assert_eq!(bonus.bonus_remaining, 0);
        assert!(bonus.pending_transition.is_none());
    }
}

fn snapshot(min_odds: f64, category: Category) -> TemplateSnapshot {
    TemplateSnapshot {
        kind: BonusKind::DepositMatch(DepositMatch {}),
        category,
        value: ValueTerms {
            amount: 100,
            max_amount: None,
            min_deposit: None,
        },
        wagering: WageringTerms {
            multiplier: 10.0,
            min_odds,
        },
        validity: Validity {
            days_to_expire: 30,
            days_to_wager: 30,
        },
        eligibility: Eligibility::default(),
    }
}

fn vertical_strategy() -> impl Strategy<Value = Vertical> {
    prop::sample::select(Vertical::ALL.to_vec())
}

fn outcome_strategy() -> impl Strategy<Value = BetOutcome> {
    prop::sample::select(vec![
        BetOutcome::Won,
        BetOutcome::Lost,
        BetOutcome::Void,
        BetOutcome::CashedOut,
    ])
}

// Bets including malformed ones: zero/negative stakes and odds below 1.0
fn bet_strategy() -> impl Strategy<Value = BetSettlement> {
    (
        -100i64..5_000,
        0.5f64..10.0,
        prop::collection::vec(0.9f64..4.0, 0..5),
        outcome_strategy(),
        vertical_strategy(),
    )
        .prop_map(|(stake, odds, legs, outcome, vertical)| BetSettlement {
            bet_id: "prop".to_string(),
            player_id: 1,
            stake,
            total_odds: odds,
            legs: legs
                .into_iter()
                .map(|odds| BetLeg {
                    selection: None,
                    odds,
                })
                .collect(),
            outcome,
            vertical,
            payout: 0,
            settled_at: Utc::now(),
            funded_by: None,
            free_bet: false,
            bonus_funds_used: 0,
        })
}

proptest! {
    #[test]
    fn test_progress_never_exceeds_requirement(
        requirement in 0i64..100_000,
        credits in prop::collection::vec(-1_000i64..20_000, 0..30),
    ) {
        let mut progress = WageringProgress::new(requirement);
        let mut total_applied = 0;
        for credit in credits {
            let applied = progress.add(credit);
            prop_assert!(applied >= 0);
            total_applied += applied;
            prop_assert!(progress.completed <= progress.requirement);
            prop_assert!(progress.progress_pct >= 0.0 && progress.progress_pct <= 100.0);
        }
        prop_assert_eq!(progress.completed, total_applied);
    }

    #[test]
    fn test_contribution_is_zero_or_stake(
        bet in bet_strategy(),
        min_odds in 1.0f64..5.0,
    ) {
        let terms = snapshot(min_odds, Category::All);
        let credit = contribution(&bet, &terms);
        prop_assert!(credit == 0 || credit == bet.stake);
        prop_assert!(credit >= 0);
        if credit > 0 {
            prop_assert!(bet.effective_odds() >= min_odds);
            prop_assert!(bet.outcome != BetOutcome::Void);
        }
    }

    #[test]
    fn test_sports_category_ignores_casino_bets(bet in bet_strategy()) {
        let terms = snapshot(1.0, Category::Sports);
        if matches!(bet.vertical, Vertical::Casino | Vertical::LiveCasino) {
            prop_assert_eq!(contribution(&bet, &terms), 0);
        }
    }

    #[test]
    fn test_tier_selection_is_monotonic(
        thresholds in prop::collection::btree_set(0i64..1_000_000, 1..8),
        a in 0i64..2_000_000,
        b in 0i64..2_000_000,
    ) {
        let mut thresholds = thresholds;
        thresholds.insert(0);
        let levels: Vec<_> = thresholds
            .iter()
            .enumerate()
            .map(|(i, min)| level(i as u32 + 1, "L", *min, 100))
            .collect();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low_tier = select_tier(&levels, low).unwrap().tier;
        let high_tier = select_tier(&levels, high).unwrap().tier;
        prop_assert!(low_tier <= high_tier);
    }
}

#[derive(Debug, Clone)]
enum Step {
    Bet { stake: i64, odds: f64, funds: i64 },
    Replay(usize),
    Advance(i64),
    Sweep,
    Cancel,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (1i64..800, 1.0f64..3.0, 0i64..200)
            .prop_map(|(stake, odds, funds)| Step::Bet { stake, odds, funds }),
        2 => (0usize..20).prop_map(Step::Replay),
        1 => (1i64..20).prop_map(Step::Advance),
        1 => Just(Step::Sweep),
        1 => Just(Step::Cancel),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_lifecycle_preserves_invariants(
        amount in 1i64..2_000,
        multiplier in 0u32..6,
        steps in prop::collection::vec(step_strategy(), 1..25),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = Harness::new();
            let template = h
                .publish(bonus_money("PROP", amount, f64::from(multiplier)))
                .await;
            let bonus = h.claim(1, &template, None).await.unwrap();
            assert_invariants(&bonus);

            let mut sent: Vec<BetSettlement> = Vec::new();
            let mut terminal_seen: Option<PlayerBonus> = None;

            for step in steps {
                match step {
                    Step::Bet { stake, odds, funds } => {
                        let mut bet = h.bet(&format!("bet-{}", sent.len()), 1, stake, odds);
                        bet.funded_by = Some(bonus.id);
                        bet.bonus_funds_used = funds;
                        sent.push(bet.clone());
                        h.orchestrator.record_bet_settlement(bet).await.unwrap();
                    }
                    Step::Replay(i) => {
                        if let Some(bet) = sent.get(i % sent.len().max(1)).cloned() {
                            let before = h.reload(&bonus).await;
                            let report = h.orchestrator.record_bet_settlement(bet).await.unwrap();
                            assert!(report.updates.is_empty());
                            assert_eq!(h.reload(&bonus).await.wagering, before.wagering);
                        }
                    }
                    Step::Advance(days) => h.clock.advance(chrono::Duration::days(days)),
                    Step::Sweep => {
                        let _ = h.orchestrator.expire(bonus.id).await;
                    }
                    Step::Cancel => {
                        let _ = h.orchestrator.cancel(bonus.id, "prop cancel", "admin").await;
                    }
                }

                let current = h.reload(&bonus).await;
                assert_invariants(&current);
                if let Some(frozen) = &terminal_seen {
                    assert_eq!(&current, frozen);
                }
                if current.status.is_terminal() && terminal_seen.is_none() {
                    terminal_seen = Some(current);
                }
            }

            // at most one wallet movement for the bonus, matching what left it
            let journal = h.wallet.journal();
            assert!(journal.len() <= 1);
            let final_state = h.reload(&bonus).await;
            match final_state.status {
                BonusStatus::Completed => {
                    assert_eq!(h.wallet.withdrawable(1), final_state.settled_amount);
                }
                status if status.is_terminal() => {
                    assert_eq!(h.wallet.forfeited(1), final_state.settled_amount);
                }
                _ => assert_eq!(journal.len(), 0),
            }
        });
    }
}
