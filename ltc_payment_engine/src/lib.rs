//! Litecoin Payment Engine
//!
//! The order-to-payment matching and crediting engine of a Litecoin storefront. Customers order products priced in
//! fiat; the engine quotes each order in litoshi, watches the chain for the payment, and credits it exactly once.
//!
//! The library is divided into a few layers:
//! 1. Storage ([`mod@traits`] and the SQLite backend, [`SqliteDatabase`]). Every guarantee about money (no double
//!    credit, no negative balance, legal order transitions only) is enforced by the storage engine, inside single
//!    transactions.
//! 2. Pure logic: amount uniquification ([`mod@uniquifier`]), payment matching ([`mod@matcher`]) and exchange-rate
//!    conversion ([`mod@rates`]).
//! 3. Adapters to the outside world: chain data ([`mod@chain`]), exchange rates ([`mod@rates`]) and address derivation
//!    ([`mod@address`]). Each sits behind a trait so that it can be scripted in tests.
//! 4. The public API ([`OrderFlowApi`], [`Reconciler`]) used by the server and its background workers.
//!
//! Every credit emits events once it has been committed. See [`mod@events`] for the hook system.
pub mod address;
pub mod chain;
pub mod config;
pub mod db_types;
pub mod events;
pub mod matcher;
pub mod rates;
pub mod traits;
pub mod uniquifier;

mod api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    errors::OrderFlowError,
    order_flow_api::OrderFlowApi,
    order_objects,
    reconciler::{ReconcileSummary, Reconciler},
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db, SqliteDatabase};
pub use traits::{AddressAssignments, ExchangeRates, LedgerDatabase, LedgerError, ProductCatalog};
