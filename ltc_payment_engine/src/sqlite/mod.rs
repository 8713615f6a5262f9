//! SQLite backend for the payment engine.
//!
//! All persistent state (orders, credited transactions, balances, address assignments, exchange rates and products)
//! lives in a single SQLite file, which is the engine's only synchronisation point.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
