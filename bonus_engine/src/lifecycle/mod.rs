//! Player bonus lifecycle: claim, wagering progress, terminal transitions
//! and reconciliation of wallet failures.
//!
//! ```text
//! pending ─▶ active ─▶ wagering ─▶ completed
//!              │          │
//!              └────┬─────┘
//!                   ▼
//!       expired | cancelled | forfeited
//! ```

pub mod errors;
pub mod orchestrator;
pub mod state_machine;

pub use errors::{BonusError, BonusResult};
pub use orchestrator::{
    BonusOrchestrator, BonusProgressUpdate, BoostPayout, ClaimRequest, ExpireOutcome,
    MAX_CONFLICT_RETRIES, ReconcileReport, SWEEPER_ACTOR, SYSTEM_ACTOR, SettlementReport,
};
pub use state_machine::ALL_STATUSES;
