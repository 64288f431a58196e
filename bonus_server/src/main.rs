//! Bonus engine server.
//!
//! Serves the admin API, runs the settlement worker pool and the periodic
//! expiry sweeper on top of an in-memory or PostgreSQL backend.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Error;
use bonus_engine::{
    Clock, SettlementWorkers, SystemClock,
    db::Database,
};
use bonus_server::{
    api::{self, AppState},
    config::{CliOverrides, ServerConfig, StoreBackend},
    engine::{Backends, Engine},
    logging, metrics,
};
use log::info;
use pico_args::Arguments;
use tokio::sync::watch;

const HELP: &str = "\
Run the bonus engine server

USAGE:
  bonus_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7070]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --store      BACKEND     memory or postgres          [default: env STORE_BACKEND or memory]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  STORE_BACKEND            memory | postgres
  SWEEP_INTERVAL_SECS      Expiry sweep interval [default: 300]
  SETTLEMENT_WORKERS       Settlement worker count [default: 4]
  WALLET_TIMEOUT_MS        Per-attempt wallet timeout [default: 2000]
  METRICS_BIND             Prometheus exporter address (disabled when unset)
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        bind: pargs.opt_value_from_str::<_, SocketAddr>("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        store: pargs.opt_value_from_fn("--store", |s| s.parse::<StoreBackend>())?,
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exposed on http://{}/metrics", addr);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (backends, database) = match config.store {
        StoreBackend::Memory => {
            log::warn!("Using the in-memory store; all state is lost on shutdown");
            (Backends::sandbox(clock), None)
        }
        StoreBackend::Postgres => {
            info!("Connecting to database");
            let db = Database::new(&config.database)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
            db.store()
                .migrate()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to apply schema: {}", e))?;
            info!("Database connected successfully");
            (Backends::postgres(db.pool(), clock), Some(db))
        }
    };

    let engine = Engine::assemble(
        backends,
        config.wallet_retry.clone(),
        config.sweeper.clone(),
    );

    let workers = SettlementWorkers::spawn(engine.orchestrator.clone(), config.workers.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = engine.sweeper.clone().spawn(shutdown_rx, |report| {
        logging::log_sweep(report);
        metrics::record_sweep(report);
    });

    let state = AppState {
        engine,
        settlements: workers.handle(),
        store: config.store.to_string(),
        database: database.clone(),
        page_size: config.page_size,
    };

    let app = api::create_router(state);

    info!("Starting HTTP server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{} ({} store). Press Ctrl+C to stop.",
        config.bind, config.store
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        log::error!("Expiry sweeper task failed: {}", e);
    }
    workers.shutdown().await;
    if let Some(db) = database {
        db.close().await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
