//! # Storage backend contracts
//!
//! The traits in this module define what a storage backend must provide for the payment engine to run on top of it.
//! [`crate::SqliteDatabase`] is the only implementation shipped with the engine.
//!
//! * [`LedgerDatabase`] is the crediting core: orders, credited transactions and balances. Every mutating method is a
//!   single atomic transaction in the backend, and all the invariants the engine promises (no double credit, no
//!   negative balance, legal status transitions only) are enforced there rather than in memory.
//! * [`AddressAssignments`] tracks the per-customer receiving addresses derived from the merchant's extended key.
//! * [`ExchangeRates`] persists the last good fiat rate so that it survives restarts.
//! * [`ProductCatalog`] is the read side of the product catalog.
mod address_assignments;
mod exchange_rates;
mod ledger_database;
mod product_catalog;

pub use address_assignments::AddressAssignments;
pub use exchange_rates::{ExchangeRateError, ExchangeRates};
pub use ledger_database::{LedgerDatabase, LedgerError};
pub use product_catalog::ProductCatalog;
