//! # Bonus Server
//!
//! HTTP admin API and background tasks around [`bonus_engine`]:
//!
//! - [`api`]: axum router, handlers and error mapping
//! - [`config`]: environment and CLI configuration
//! - [`engine`]: component wiring over the memory or PostgreSQL backend
//! - [`logging`]: tracing subscriber and structured log helpers
//! - [`metrics`]: Prometheus counters

pub mod api;
pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
