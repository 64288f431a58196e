//! Cashback tiers keyed to trailing wager volume.

pub mod engine;
pub mod errors;
pub mod models;

pub use engine::{CashbackTierEngine, quote_cashback, select_tier, validate_book};
pub use errors::{CashbackError, CashbackResult};
pub use models::{
    BPS_DENOMINATOR, CashbackLevel, CashbackPeriod, CashbackQuote, LevelBenefits, PeriodCaps,
    TRAILING_WINDOW_DAYS, VerticalRates,
};
