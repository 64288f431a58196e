use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use bonus_engine::{
    cashback::{CashbackLevel, CashbackPeriod, LevelBenefits, PeriodCaps, VerticalRates, quote_cashback, select_tier},
    catalog::{
        BonusKind, Category, ComboBoost, Eligibility, TemplateSnapshot, Validity, ValueTerms,
        WageringTerms,
    },
    wagering::{BetLeg, BetOutcome, BetSettlement, Vertical, combo_boost_amount, contribution},
};
use std::hint::black_box;

/// Helper to create a settled ticket with `legs` selections
fn ticket(legs: usize, vertical: Vertical) -> BetSettlement {
    BetSettlement {
        bet_id: format!("bench-{legs}"),
        player_id: 1,
        stake: 1_000,
        total_odds: 1.9,
        legs: (0..legs)
            .map(|_| BetLeg {
                selection: None,
                odds: 1.45,
            })
            .collect(),
        outcome: BetOutcome::Won,
        vertical,
        payout: 5_000,
        settled_at: Utc::now(),
        funded_by: None,
        free_bet: false,
        bonus_funds_used: 0,
    }
}

fn combo_terms() -> TemplateSnapshot {
    TemplateSnapshot {
        kind: BonusKind::ComboBoost(ComboBoost {
            min_legs: 3,
            boost_per_leg_pct: 5,
            max_boost_pct: 50,
        }),
        category: Category::Sports,
        value: ValueTerms {
            amount: 10_000,
            max_amount: None,
            min_deposit: None,
        },
        wagering: WageringTerms {
            multiplier: 5.0,
            min_odds: 1.5,
        },
        validity: Validity {
            days_to_expire: 30,
            days_to_wager: 30,
        },
        eligibility: Eligibility::default(),
    }
}

fn level_book(n: u32) -> Vec<CashbackLevel> {
    (1..=n)
        .map(|tier| CashbackLevel {
            tier,
            name: format!("Tier {tier}"),
            min_monthly_wager: i64::from(tier - 1) * 100_000,
            rates: VerticalRates {
                sports: 50 * tier,
                casino: 80 * tier,
                live_casino: 60 * tier,
                virtual_sports: 40 * tier,
            },
            caps: PeriodCaps {
                day: Some(10_000),
                week: Some(50_000),
                month: None,
            },
            benefits: LevelBenefits::default(),
        })
        .collect()
}

/// Benchmark wagering contribution for singles and accumulators
fn bench_contribution(c: &mut Criterion) {
    let terms = combo_terms();
    let mut group = c.benchmark_group("contribution");
    for legs in [0usize, 4, 12] {
        let bet = ticket(legs, Vertical::Sports);
        group.bench_with_input(BenchmarkId::from_parameter(legs), &bet, |b, bet| {
            b.iter(|| contribution(black_box(bet), black_box(&terms)));
        });
    }
    group.finish();
}

/// Benchmark combo boost on a winning accumulator
fn bench_combo_boost(c: &mut Criterion) {
    let terms = combo_terms();
    let bet = ticket(8, Vertical::Sports);
    c.bench_function("combo_boost_amount_8_legs", |b| {
        b.iter(|| combo_boost_amount(black_box(&bet), black_box(&terms)));
    });
}

/// Benchmark tier lookup across book sizes
fn bench_select_tier(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_tier");
    for size in [5u32, 20, 100] {
        let book = level_book(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &book, |b, book| {
            b.iter(|| select_tier(black_box(book), black_box(1_234_567)));
        });
    }
    group.finish();
}

/// Benchmark a monthly cashback quote over a month of bets
fn bench_quote_cashback(c: &mut Criterion) {
    let book = level_book(10);
    let now = Utc::now();
    let bets: Vec<_> = (0..1_000)
        .map(|i| {
            let mut bet = ticket(0, Vertical::ALL[i % Vertical::ALL.len()]);
            bet.outcome = if i % 3 == 0 { BetOutcome::Won } else { BetOutcome::Lost };
            bet.payout = if i % 3 == 0 { 1_900 } else { 0 };
            bet
        })
        .collect();

    c.bench_function("quote_cashback_1000_bets", |b| {
        b.iter(|| {
            quote_cashback(
                black_box(&book[4]),
                1,
                CashbackPeriod::Month,
                (now, now),
                black_box(500_000),
                black_box(&bets),
            )
        });
    });
}

criterion_group!(wagering, bench_contribution, bench_combo_boost);

criterion_group!(cashback, bench_select_tier, bench_quote_cashback);

criterion_main!(wagering, cashback);
