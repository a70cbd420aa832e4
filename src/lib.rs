//! # safeledger
//!
//! Monetary ledger and ownership revenue-sharing core for a property-sales back office.
//!
//! Safes hold money; vouchers and transfers move it, and every safe's balance stays
//! equal to its opening balance plus its active movements and never goes negative.
//! Partners own units directly or through groups, and the revenue calculator attributes
//! unit receipts to them. Broker dues and partner debts are tracked alongside.
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use safeledger::{Ledger, MemoryStore, NewVoucher};
//!
//! let ledger = Ledger::new(MemoryStore::new());
//! let main = ledger.safes().create("Main", Decimal::from(1000))?;
//! let posted = ledger
//!     .vouchers()
//!     .apply(NewVoucher::receipt(main.id, Decimal::from(500), "Installment"))?;
//! assert_eq!(posted.safe_balance, Decimal::from(1500));
//! # Ok::<(), safeledger::LedgerError>(())
//! ```
//!
//! Persistence goes through [`store::LedgerStore`]: [`MemoryStore`] for tests and
//! embedding, [`PgStore`] for PostgreSQL.

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod filter;
pub mod ledger;
mod macros;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod obligations;
pub mod ownership;
pub mod pool;
pub mod revenue;
pub mod store;
pub mod transaction;
pub mod validation;

pub use config::{LedgerConfig, LedgerSettings};
pub use error::{LedgerError, PercentageScope, Result, StoreError};
pub use filter::{ObligationFilter, TransferFilter, VoucherFilter};
pub use ledger::Ledger;
pub use model::*;
pub use store::{LedgerStore, MemoryStore, PgStore};
