//! Bonus template catalog.
//!
//! Templates are the admin-authored offers players claim. Once a template
//! has been claimed its financial terms are frozen; every claimed bonus
//! carries its own [`TemplateSnapshot`] anyway.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{CatalogError, CatalogResult};
pub use manager::{TemplateCatalog, validate_template};
pub use models::{
    BonusKind, BonusMoney, BonusTemplate, BonusType, Cashback, Category, ComboBoost, DepositMatch,
    Eligibility, FreeBet, FreeSpins, Grant, GrantContext, Loyalty, NewTemplate, NoDeposit,
    PayoutRule, Referral, ReloadBonus, TemplateFilter, TemplateId, TemplatePatch,
    TemplateSnapshot, TemplateStatus, Validity, ValueTerms, WageringTerms,
};
