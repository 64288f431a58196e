//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use bonus_engine::{
    RetryPolicy, SweeperConfig, WorkerPoolConfig,
    db::{DEFAULT_PAGE_SIZE, DatabaseConfig},
};
use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store and wallet, state is lost on restart
    Memory,
    /// PostgreSQL store and wallet
    Postgres,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Values given on the command line, taking precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub store: Option<StoreBackend>,
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    pub store: StoreBackend,
    /// Database configuration (used by the postgres backend)
    pub database: DatabaseConfig,
    /// Whether `DATABASE_URL` was given explicitly
    pub database_url_set: bool,
    pub sweeper: SweeperConfig,
    pub workers: WorkerPoolConfig,
    /// Wallet call timeout and retry policy
    pub wallet_retry: RetryPolicy,
    /// Prometheus exporter address, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Default page size of admin listings
    pub page_size: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `overrides` - Values parsed from CLI arguments
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but cannot be parsed
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => parse_env_required_format("SERVER_BIND")?
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 7070))),
        };

        let store = match overrides.store {
            Some(store) => store,
            None => match std::env::var("STORE_BACKEND") {
                Ok(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                    var: "STORE_BACKEND".to_string(),
                    reason,
                })?,
                Err(_) => StoreBackend::Memory,
            },
        };

        let env_url = std::env::var("DATABASE_URL").ok();
        let database_url_set = overrides.database_url.is_some() || env_url.is_some();
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = overrides.database_url {
            database.database_url = url;
        }

        let sweeper = SweeperConfig {
            interval: Duration::from_secs(parse_env_or("SWEEP_INTERVAL_SECS", 300)),
            batch_size: parse_env_or("SWEEP_BATCH_SIZE", 500),
        };

        let workers = WorkerPoolConfig {
            workers: parse_env_or("SETTLEMENT_WORKERS", 4),
            queue_capacity: parse_env_or("SETTLEMENT_QUEUE_CAPACITY", 1024),
        };

        let wallet_retry = RetryPolicy {
            timeout: Duration::from_millis(parse_env_or("WALLET_TIMEOUT_MS", 2000)),
            max_retries: parse_env_or("WALLET_MAX_RETRIES", 3),
            base_backoff: Duration::from_millis(parse_env_or("WALLET_BACKOFF_BASE_MS", 100)),
            max_backoff: Duration::from_millis(parse_env_or("WALLET_BACKOFF_MAX_MS", 2000)),
        };

        let metrics_bind = parse_env_required_format("METRICS_BIND")?;

        Ok(ServerConfig {
            bind,
            store,
            database,
            database_url_set,
            sweeper,
            workers,
            wallet_retry,
            metrics_bind,
            page_size: parse_env_or("PAGE_SIZE", DEFAULT_PAGE_SIZE),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store == StoreBackend::Postgres && !self.database_url_set {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Required with STORE_BACKEND=postgres, or pass --db-url".to_string(),
            });
        }

        if self.sweeper.interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SWEEP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.sweeper.batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "SWEEP_BATCH_SIZE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.workers.workers == 0 {
            return Err(ConfigError::Invalid {
                var: "SETTLEMENT_WORKERS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.workers.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "SETTLEMENT_QUEUE_CAPACITY".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.wallet_retry.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "WALLET_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.wallet_retry.base_backoff > self.wallet_retry.max_backoff {
            return Err(ConfigError::Invalid {
                var: "WALLET_BACKOFF_BASE_MS".to_string(),
                reason: format!(
                    "Must not exceed WALLET_BACKOFF_MAX_MS ({} ms)",
                    self.wallet_retry.max_backoff.as_millis()
                ),
            });
        }

        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                var: "PAGE_SIZE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Optional variable that must parse when present
fn parse_env_required_format<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}
