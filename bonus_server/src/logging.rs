//! Structured logging configuration.
//!
//! Library crates log through the `log` facade; the subscriber installed here
//! picks those records up alongside the server's own `tracing` events.

use bonus_engine::SweepReport;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG`, defaulting to `info,sqlx=warn,hyper=warn`.
///
/// # Example
///
/// ```no_run
/// use bonus_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log an operator action against a template, level or bonus
///
/// # Example
///
/// ```
/// use bonus_server::logging::log_admin_action;
///
/// log_admin_action(
///     "cancel_bonus",
///     "admin",
///     "6f1c9a1e-93c4-4c8e-9d1f-1b8e7c3f0a11",
///     "Duplicate account",
/// );
/// ```
pub fn log_admin_action(action: &str, actor: &str, target: &str, message: &str) {
    tracing::info!(
        action = action,
        actor = actor,
        target_id = target,
        "ADMIN: {}",
        message
    );
}

/// Log performance metric
///
/// Operations slower than a second are logged at `warn`.
///
/// # Example
///
/// ```
/// use bonus_server::logging::log_performance;
/// use std::time::Instant;
///
/// let start = Instant::now();
/// // ... do work ...
/// let duration = start.elapsed().as_millis() as u64;
/// log_performance("expiry_sweep", duration, Some("batch=500"));
/// ```
pub fn log_performance(operation: &str, duration_ms: u64, metadata: Option<&str>) {
    if duration_ms > 1000 {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "PERFORMANCE: Slow operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "Performance metric"
        );
    }
}

/// Log the outcome of one sweeper tick
pub fn log_sweep(report: &SweepReport) {
    if report.failed > 0 {
        tracing::warn!(
            scanned = report.scanned,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            reconciled = report.reconciled,
            "Expiry sweep finished with failures"
        );
    } else if report.scanned > 0 || report.reconciled > 0 {
        tracing::info!(
            scanned = report.scanned,
            expired = report.expired,
            skipped = report.skipped,
            reconciled = report.reconciled,
            "Expiry sweep finished"
        );
    } else {
        tracing::debug!("Expiry sweep found nothing due");
    }
}
