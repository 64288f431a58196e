//! Prometheus metrics for the bonus engine server.
//!
//! Counters are recorded through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the exporter, which only happens when
//! `METRICS_BIND` is configured.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bonus_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/bonus-engine/claims", 201);
//! metrics::bonus_claims_total("claimed");
//! ```

use bonus_engine::{BonusStatus, SweepReport};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Bonus Metrics
// ============================================================================

/// Record a claim attempt by result (`claimed`, `rejected`, `error`).
pub fn bonus_claims_total(result: &str) {
    metrics::counter!("bonus_claims_total", "result" => result.to_string()).increment(1);
}

/// Record a settlement submission by result (`queued`, `rejected`).
pub fn bet_settlements_total(result: &str) {
    metrics::counter!("bet_settlements_total", "result" => result.to_string()).increment(1);
}

/// Record a bonus reaching `status`.
pub fn bonus_transitions_total(status: BonusStatus) {
    metrics::counter!("bonus_transitions_total", "to" => status.to_string()).increment(1);
}

/// Record a settlement refused because the queue was full.
pub fn settlement_queue_rejections_total() {
    metrics::counter!("settlement_queue_rejections_total").increment(1);
}

// ============================================================================
// Sweeper Metrics
// ============================================================================

/// Record one sweeper tick.
pub fn record_sweep(report: &SweepReport) {
    metrics::counter!("expiry_sweeps_total").increment(1);
    metrics::counter!("bonuses_expired_total").increment(report.expired as u64);
    if report.expired > 0 {
        metrics::counter!("bonus_transitions_total", "to" => BonusStatus::Expired.to_string())
            .increment(report.expired as u64);
    }
}
