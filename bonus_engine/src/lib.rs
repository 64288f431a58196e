//! # Bonus Engine
//!
//! Bonus and wagering lifecycle engine for a sportsbook and casino platform.
//!
//! Operators publish bonus templates; players claim them into per-player
//! bonuses that track a wagering requirement, free bets and a bonus balance.
//! Settled bets move wagering progress forward. Completion converts the
//! remaining balance to withdrawable money through the wallet, while expiry,
//! cancellation and forfeiture remove it.
//!
//! ## Core Modules
//!
//! - [`catalog`]: Bonus templates and the ten payout variants
//! - [`wagering`]: Bet settlement model and the wagering contribution rules
//! - [`cashback`]: Cashback tiers keyed to trailing 30-day wager
//! - [`ledger`]: Player bonus records and their append-only ledger
//! - [`lifecycle`]: Claim, wagering and terminal transition orchestration
//! - [`sweeper`]: Periodic expiry of overdue bonuses
//! - [`workers`]: Settlement worker pool
//! - [`wallet`]: Wallet seam with idempotent credit/debit and retry policy
//! - [`db`]: Repository traits with in-memory and PostgreSQL backends
//!
//! ## Example
//!
//! ```
//! use bonus_engine::{BonusStatus, ledger::WageringProgress};
//!
//! let mut progress = WageringProgress::new(2000);
//! progress.add(2500);
//! assert!(progress.is_satisfied());
//! assert!(BonusStatus::Active.can_transition_to(BonusStatus::Wagering));
//! ```

pub mod cashback;
pub mod catalog;
pub mod clock;
pub mod db;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod stats;
pub mod sweeper;
pub mod wagering;
pub mod wallet;
pub mod workers;

pub use cashback::{CashbackError, CashbackLevel, CashbackPeriod, CashbackQuote, CashbackTierEngine};
pub use catalog::{BonusKind, BonusTemplate, BonusType, CatalogError, Category, TemplateCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{BonusStatus, LedgerEntry, PlayerBonus};
pub use lifecycle::{BonusError, BonusOrchestrator, ClaimRequest, SettlementReport};
pub use stats::{BonusStats, BonusTotals};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperConfig};
pub use wagering::BetSettlement;
pub use wallet::{MemoryWallet, RetryPolicy, WalletService};
pub use workers::{SettlementHandle, SettlementWorkers, WorkerPoolConfig};
