//! Wallet collaborator: interface, backends and retry policy.
//!
//! The engine never owns player money. It asks the wallet to credit
//! converted bonus funds and to debit forfeited ones, always with an
//! idempotency key of the form `{bonus_id}:{transition}`.
//!
//! ## Example
//!
//! ```no_run
//! use bonus_engine::wallet::{MemoryWallet, RetryPolicy, WalletReason, WalletService};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let wallet = MemoryWallet::new();
//!     let bonus_id = Uuid::new_v4();
//!     let reason = WalletReason::BonusConversion { bonus_id };
//!     let key = format!("{bonus_id}:completed");
//!
//!     let receipt = RetryPolicy::default()
//!         .execute("credit", || wallet.credit(42, 200, &reason, &key))
//!         .await?;
//!     println!("Balance after conversion: {}", receipt.balance_after);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod retry;
pub mod service;

pub use errors::{WalletError, WalletResult};
pub use memory::MemoryWallet;
pub use models::{EntryDirection, WalletReason, WalletReceipt};
pub use postgres::PgWallet;
pub use retry::RetryPolicy;
pub use service::WalletService;
