//! Periodic expiry sweep.
//!
//! Scans open bonuses past their wagering deadline and expires them through
//! the orchestrator, which re-checks status under the bonus lock. Running a
//! sweep twice over the same data changes nothing the second time.

use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::lifecycle::{BonusOrchestrator, BonusResult, ExpireOutcome};

/// Sweeper configuration
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// Maximum bonuses expired (and reconciled) per tick
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 500,
        }
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Flagged transitions committed by the reconciliation pass
    pub reconciled: usize,
}

pub struct ExpirySweeper {
    orchestrator: Arc<BonusOrchestrator>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(orchestrator: Arc<BonusOrchestrator>, config: SweeperConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Expire one batch of due bonuses.
    pub async fn sweep_once(&self) -> BonusResult<SweepReport> {
        let due = self
            .orchestrator
            .due_for_expiry(self.config.batch_size)
            .await?;

        let mut report = SweepReport {
            scanned: due.len(),
            ..Default::default()
        };

        for bonus in due {
            match self.orchestrator.expire(bonus.id).await {
                Ok(ExpireOutcome::Expired(_)) => report.expired += 1,
                Ok(ExpireOutcome::Skipped(reason)) => {
                    log::debug!("Sweep skipped bonus {}: {}", bonus.id, reason);
                    report.skipped += 1;
                }
                Err(e) => {
                    log::warn!("Sweep could not expire bonus {}: {}", bonus.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// One full tick: expiry batch followed by a reconciliation pass.
    pub async fn tick(&self) -> BonusResult<SweepReport> {
        let mut report = self.sweep_once().await?;
        let reconciled = self
            .orchestrator
            .reconcile_pending(self.config.batch_size)
            .await?;
        report.reconciled = reconciled.committed;
        Ok(report)
    }

    /// Run [`tick`](Self::tick) on a fixed interval until `shutdown` flips to
    /// `true`. `on_report` sees every completed tick.
    pub fn spawn<F>(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, mut on_report: F) -> JoinHandle<()>
    where
        F: FnMut(&SweepReport) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            log::info!(
                "Expiry sweeper started (interval {:?}, batch {})",
                self.config.interval,
                self.config.batch_size
            );

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match self.tick().await {
                            Ok(report) => on_report(&report),
                            Err(e) => log::error!("Expiry sweep failed: {}", e),
                        }
                    }
                }
            }

            log::info!("Expiry sweeper stopped");
        })
    }
}
