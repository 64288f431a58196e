//! Settlement worker pool.
//!
//! Bet settlements are queued on a bounded channel and applied by a fixed
//! number of tokio tasks. Per-bonus locks inside the orchestrator keep
//! concurrent workers from interleaving on the same bonus.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use thiserror::Error;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};

use crate::{lifecycle::BonusOrchestrator, wagering::BetSettlement};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("Settlement queue is full")]
    QueueFull,

    #[error("Settlement workers are shutting down")]
    ShuttingDown,
}

/// Counters shared by all workers
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub rejected: AtomicU64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.processed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }
}

/// Cloneable producer side of the queue
#[derive(Clone)]
pub struct SettlementHandle {
    sender: mpsc::Sender<BetSettlement>,
    closing: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl SettlementHandle {
    /// Queue a settlement, waiting for room when the queue is full.
    pub async fn submit(&self, bet: BetSettlement) -> Result<(), WorkerError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(WorkerError::ShuttingDown);
        }
        self.sender
            .send(bet)
            .await
            .map_err(|_| WorkerError::ShuttingDown)
    }

    /// Queue a settlement or fail fast when the queue is full.
    pub fn try_submit(&self, bet: BetSettlement) -> Result<(), WorkerError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(WorkerError::ShuttingDown);
        }
        self.sender.try_send(bet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                WorkerError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => WorkerError::ShuttingDown,
        })
    }

    /// Free slots in the queue
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

/// Running worker pool
pub struct SettlementWorkers {
    handle: SettlementHandle,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SettlementWorkers {
    pub fn spawn(orchestrator: Arc<BonusOrchestrator>, config: WorkerPoolConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(WorkerStats::default());

        let tasks = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    orchestrator.clone(),
                    receiver.clone(),
                    shutdown_rx.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        log::info!(
            "Started {} settlement workers (queue capacity {})",
            config.workers.max(1),
            config.queue_capacity.max(1)
        );

        Self {
            handle: SettlementHandle {
                sender,
                closing: Arc::new(AtomicBool::new(false)),
                stats,
            },
            shutdown,
            tasks,
        }
    }

    pub fn handle(&self) -> SettlementHandle {
        self.handle.clone()
    }

    /// Stop accepting work, drain what is queued and wait for every worker.
    pub async fn shutdown(self) {
        self.handle.closing.store(true, Ordering::Release);
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Settlement worker panicked: {}", e);
            }
        }
        let (processed, failed, rejected) = self.handle.stats.snapshot();
        log::info!(
            "Settlement workers stopped: {} processed, {} failed, {} rejected",
            processed,
            failed,
            rejected
        );
    }
}

async fn run_worker(
    worker_id: usize,
    orchestrator: Arc<BonusOrchestrator>,
    receiver: Arc<Mutex<mpsc::Receiver<BetSettlement>>>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<WorkerStats>,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => None,
            bet = async { receiver.lock().await.recv().await } => bet,
        };
        match next {
            Some(bet) => process(worker_id, &orchestrator, bet, &stats).await,
            None => break,
        }
    }

    // drain
    loop {
        let next = receiver.lock().await.try_recv();
        match next {
            Ok(bet) => process(worker_id, &orchestrator, bet, &stats).await,
            Err(_) => break,
        }
    }

    log::debug!("Settlement worker {} exiting", worker_id);
}

async fn process(
    worker_id: usize,
    orchestrator: &BonusOrchestrator,
    bet: BetSettlement,
    stats: &WorkerStats,
) {
    let bet_id = bet.bet_id.clone();
    match orchestrator.record_bet_settlement(bet).await {
        Ok(report) => {
            stats.processed.fetch_add(1, Ordering::Relaxed);
            if !report.failed.is_empty() {
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
            log::debug!(
                "Worker {} applied bet {}: {} updated, {} completed, {} replayed",
                worker_id,
                bet_id,
                report.updates.len(),
                report.completed.len(),
                report.replayed.len()
            );
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            log::warn!("Worker {} failed to apply bet {}: {}", worker_id, bet_id, e);
        }
    }
}
