//! # Payment engine public API
//!
//! * [`order_flow_api`] is what the storefront talks to: quoting and creating orders, checking payments, customer
//!   balances and cancellations.
//! * [`reconciler`] drives observation, matching and crediting. The background worker calls
//!   [`reconciler::Reconciler::reconcile_once`] on a timer; customer-initiated checks go through the order flow API,
//!   which delegates to the same reconciler.
//!
//! Both are built on top of a storage backend implementing [`crate::LedgerDatabase`]:
//!
//! ```rust,ignore
//! let db = SqliteDatabase::new_with_url("sqlite://data/ltc_store.db", 25).await?;
//! let api = OrderFlowApi::new(db, mode, observer, CoinGeckoSource::new(COINGECKO_API, timeout)?, &config, producers);
//! let invoice = api.initiate_order("alice", 1).await?;
//! ```
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod reconciler;
