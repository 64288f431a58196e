//! Wagering contribution rules.

pub mod calculator;
pub mod models;

pub use calculator::{combo_boost_amount, combo_boost_percent, contribution};
pub use models::{BetLeg, BetOutcome, BetSettlement, Vertical};
