//! Integration tests for the settlement worker pool and the background sweeper.

mod common;

use bonus_engine::{
    ledger::BonusStatus,
    sweeper::{ExpirySweeper, SweepReport, SweeperConfig},
    workers::{SettlementWorkers, WorkerError, WorkerPoolConfig},
};
use chrono::Duration as ChronoDuration;
use common::{Harness, bonus_money};
use std::{sync::Arc, sync::atomic::Ordering, time::Duration};
use tokio::sync::{mpsc, watch};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_apply_every_queued_settlement() {
    let h = Harness::new();
    let template = h.publish(bonus_money("POOL", 10_000, 10.0)).await;
    let bonus = h.claim(1, &template, None).await.unwrap();

    let workers = SettlementWorkers::spawn(
        h.orchestrator.clone(),
        WorkerPoolConfig {
            workers: 4,
            queue_capacity: 16,
        },
    );
    let handle = workers.handle();

    for i in 0..40 {
        handle
            .submit(h.bet(&format!("pool-{i}"), 1, 100, 2.0))
            .await
            .unwrap();
    }
    // replays are harmless
    for i in 0..10 {
        handle
            .submit(h.bet(&format!("pool-{i}"), 1, 100, 2.0))
            .await
            .unwrap();
    }

    workers.shutdown().await;

    let bonus = h.reload(&bonus).await;
    assert_eq!(bonus.wagering.completed, 4_000);
    assert_eq!(bonus.processed_bets.len(), 40);
    assert_eq!(handle.stats().processed.load(Ordering::Relaxed), 50);

    let err = handle
        .submit(h.bet("after-shutdown", 1, 100, 2.0))
        .await
        .unwrap_err();
    assert_eq!(err, WorkerError::ShuttingDown);
}

#[tokio::test]
async fn test_try_submit_fails_fast_when_full() {
    let h = Harness::new();
    let template = h.publish(bonus_money("SLOW", 100, 1.0)).await;
    h.claim(1, &template, None).await.unwrap();
    h.wallet.set_delay(Some(Duration::from_millis(300)));

    let workers = SettlementWorkers::spawn(
        h.orchestrator.clone(),
        WorkerPoolConfig {
            workers: 1,
            queue_capacity: 1,
        },
    );
    let handle = workers.handle();

    // completes the bonus, so the worker blocks on the slow wallet
    handle.try_submit(h.bet("slow-1", 1, 100, 2.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.try_submit(h.bet("slow-2", 1, 100, 2.0)).unwrap();
    let err = handle.try_submit(h.bet("slow-3", 1, 100, 2.0)).unwrap_err();
    assert_eq!(err, WorkerError::QueueFull);
    assert_eq!(handle.stats().rejected.load(Ordering::Relaxed), 1);

    workers.shutdown().await;
    assert_eq!(handle.stats().processed.load(Ordering::Relaxed), 2);
    assert_eq!(h.wallet.withdrawable(1), 100);
}

#[tokio::test]
async fn test_background_sweeper_expires_and_stops() {
    let h = Harness::new();
    let template = h.publish(bonus_money("BG", 60, 10.0)).await;
    let bonus = h.claim(1, &template, None).await.unwrap();
    h.clock.advance(ChronoDuration::days(45));

    let sweeper = Arc::new(ExpirySweeper::new(
        h.orchestrator.clone(),
        SweeperConfig {
            interval: Duration::from_millis(10),
            batch_size: 10,
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<SweepReport>();
    let task = sweeper.spawn(shutdown_rx, move |report| {
        let _ = report_tx.send(report.clone());
    });

    let first = report_rx.recv().await.unwrap();
    assert_eq!(first.expired, 1);
    let second = report_rx.recv().await.unwrap();
    assert_eq!(second.scanned, 0);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(h.reload(&bonus).await.status, BonusStatus::Expired);
    assert_eq!(h.wallet.forfeited(1), 60);
}

#[tokio::test]
async fn test_sweeper_tick_reconciles_flagged_bonuses() {
    let h = Harness::new();
    let template = h.publish(bonus_money("RECON", 40, 1.0)).await;
    let bonus = h.claim(1, &template, None).await.unwrap();

    h.wallet.fail_next(3);
    h.orchestrator
        .record_bet_settlement(h.bet("r-1", 1, 40, 2.0))
        .await
        .unwrap();
    assert!(h.reload(&bonus).await.needs_reconciliation());

    let sweeper = ExpirySweeper::new(h.orchestrator.clone(), SweeperConfig::default());
    let report = sweeper.tick().await.unwrap();
    assert_eq!(report.reconciled, 1);
    assert_eq!(h.reload(&bonus).await.status, BonusStatus::Completed);
    assert_eq!(h.wallet.withdrawable(1), 40);
}
