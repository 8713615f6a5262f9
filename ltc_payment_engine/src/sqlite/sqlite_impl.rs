//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
//!
//! Every mutating transaction starts with a write. SQLite then takes the write lock before anything is read, so two
//! racing callers (the background poller and a customer's "check now", say) are serialised, and the second one sees
//! the first one's committed result.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use lpg_common::Litoshi;
use sqlx::{migrate, SqlitePool};

use super::db::{addresses, balances, credits, db_url, exchange_rates, is_unique_violation, new_pool, orders, products};
use crate::{
    address::{AddressDeriver, AllocationError, DerivationError},
    db_types::{
        AddressAssignment,
        Balance,
        CreditResult,
        CreditTarget,
        CreditedTransaction,
        DebitResult,
        IllegalTransition,
        NewCredit,
        NewOrder,
        NewProduct,
        Order,
        OrderId,
        OrderStatusType,
        PaymentFromBalance,
        Product,
    },
    rates::ExchangeRate,
    traits::{AddressAssignments, ExchangeRateError, ExchangeRates, LedgerDatabase, LedgerError, ProductCatalog},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the `LPG_DATABASE_URL` environment variable (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    /// Creates a new database API object. The database file is created if it does not exist yet.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        debug!("🗃️ Migrations are up to date for {}", self.url);
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn order_or_not_found(&self, order_id: OrderId) -> Result<Order, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, &mut conn).await?.ok_or(LedgerError::OrderNotFound(order_id))
    }

    async fn credit_order(
        &self,
        order_id: OrderId,
        credit: &NewCredit,
        now: DateTime<Utc>,
    ) -> Result<CreditResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let record = match credits::insert_order_credit(&order_id, credit, now, &mut tx).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tx.rollback().await?;
                return Err(LedgerError::OrderNotFound(order_id));
            },
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                debug!("💰️ {}:{} for {} has already been credited", credit.address, credit.txid, credit.value);
                return Ok(CreditResult::AlreadyCredited);
            },
            Err(e) => return Err(e.into()),
        };
        match orders::mark_paid(order_id, Some(&credit.txid), now, &mut tx).await? {
            Some(order) => {
                tx.commit().await?;
                info!("💰️ Order {order_id} is paid by {} ({})", credit.txid, credit.value);
                Ok(CreditResult::OrderPaid { order, credit: record })
            },
            None => {
                // Roll back the credit record too, so the payment is not swallowed
                tx.rollback().await?;
                let order = self.order_or_not_found(order_id).await?;
                warn!(
                    "💰️ {} ({}) matched order {order_id}, but the order is {}. The payment was not credited.",
                    credit.txid, credit.value, order.status
                );
                Ok(CreditResult::OrderNotPending(order))
            },
        }
    }

    async fn credit_customer(
        &self,
        customer_id: &str,
        credit: &NewCredit,
        now: DateTime<Utc>,
    ) -> Result<CreditResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let record = match credits::insert_customer_credit(customer_id, credit, now, &mut tx).await {
            Ok(record) => record,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                debug!("💰️ {}:{} for {} has already been credited", credit.address, credit.txid, credit.value);
                return Ok(CreditResult::AlreadyCredited);
            },
            Err(e) => return Err(e.into()),
        };
        let balance = balances::credit_balance(customer_id, credit.value, now, &mut tx).await?;
        tx.commit().await?;
        info!("💰️ {} credited to {customer_id} from {}. Balance is now {}", credit.value, credit.txid, balance.amount);
        Ok(CreditResult::BalanceCredited { balance, credit: record })
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_pending_orders_for_address(&self, address: &str) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_pending_orders_for_address(address, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_pending_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_pending_orders_for_customer(customer_id, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_pending_order_addresses(&self) -> Result<Vec<String>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let addresses = orders::fetch_pending_order_addresses(&mut conn).await?;
        Ok(addresses)
    }

    async fn credit(&self, credit: NewCredit) -> Result<CreditResult, LedgerError> {
        if !credit.value.is_positive() {
            return Err(LedgerError::InvalidCreditValue(credit.value));
        }
        let now = Utc::now();
        match &credit.target {
            CreditTarget::Order(order_id) => self.credit_order(*order_id, &credit, now).await,
            CreditTarget::Customer(customer_id) => self.credit_customer(customer_id, &credit, now).await,
        }
    }

    async fn credited_transactions_for_address(
        &self,
        address: &str,
    ) -> Result<Vec<CreditedTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let credits = credits::fetch_credits_for_address(address, &mut conn).await?;
        Ok(credits)
    }

    async fn fetch_credited_transaction(&self, txid: &str) -> Result<Option<CreditedTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let credit = credits::fetch_credit_by_txid(txid, &mut conn).await?;
        Ok(credit)
    }

    async fn fetch_balance(&self, customer_id: &str) -> Result<Balance, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let balance = balances::fetch_balance(customer_id, &mut conn).await?;
        Ok(balance.unwrap_or_else(|| Balance::zero(customer_id)))
    }

    async fn debit_for_purchase(&self, customer_id: &str, amount: Litoshi) -> Result<DebitResult, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        match balances::debit_balance(customer_id, amount, Utc::now(), &mut conn).await? {
            Some(balance) => {
                debug!("💰️ Debited {amount} from {customer_id}. Balance is now {}", balance.amount);
                Ok(DebitResult::Debited(balance))
            },
            None => {
                debug!("💰️ {customer_id} has insufficient funds for a debit of {amount}");
                Ok(DebitResult::InsufficientFunds)
            },
        }
    }

    async fn pay_order_from_balance(&self, order_id: OrderId) -> Result<PaymentFromBalance, LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order = match orders::mark_paid(order_id, None, now, &mut tx).await? {
            Some(order) => order,
            None => {
                tx.rollback().await?;
                let order = self.order_or_not_found(order_id).await?;
                return Ok(PaymentFromBalance::OrderNotPending(order));
            },
        };
        match balances::debit_balance(&order.customer_id, order.required_amount, now, &mut tx).await? {
            Some(balance) => {
                tx.commit().await?;
                info!(
                    "💰️ Order {order_id} paid from the balance of {}. Balance is now {}",
                    order.customer_id, balance.amount
                );
                Ok(PaymentFromBalance::Paid { order, balance })
            },
            None => {
                tx.rollback().await?;
                trace!("💰️ Balance of {} does not cover order {order_id}", order.customer_id);
                Ok(PaymentFromBalance::InsufficientFunds)
            },
        }
    }

    async fn cancel_or_expire_order(
        &self,
        order_id: OrderId,
        new_status: OrderStatusType,
    ) -> Result<Order, LedgerError> {
        if !matches!(new_status, OrderStatusType::Expired | OrderStatusType::Cancelled) {
            return Err(IllegalTransition { from: OrderStatusType::Pending, to: new_status }.into());
        }
        let mut conn = self.pool.acquire().await?;
        match orders::annul_order(order_id, new_status, Utc::now(), &mut conn).await? {
            Some(order) => {
                info!("🧾️ Order {order_id} is now {new_status}");
                Ok(order)
            },
            None => {
                let order = orders::fetch_order(order_id, &mut conn).await?.ok_or(LedgerError::OrderNotFound(order_id))?;
                Err(IllegalTransition { from: order.status, to: new_status }.into())
            },
        }
    }

    async fn expire_old_orders(&self, limit: Duration) -> Result<Vec<Order>, LedgerError> {
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;
        let expired = orders::expire_orders(now - limit, now, &mut conn).await?;
        Ok(expired)
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl AddressAssignments for SqliteDatabase {
    async fn fetch_assignment(&self, customer_id: &str) -> Result<Option<AddressAssignment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let assignment = addresses::fetch_assignment(customer_id, &mut conn).await?;
        Ok(assignment)
    }

    async fn fetch_assignment_by_address(&self, address: &str) -> Result<Option<AddressAssignment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let assignment = addresses::fetch_assignment_by_address(address, &mut conn).await?;
        Ok(assignment)
    }

    async fn touch_assignment(&self, customer_id: &str) -> Result<Option<AddressAssignment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let assignment = addresses::touch_assignment(customer_id, Utc::now(), &mut conn).await?;
        Ok(assignment)
    }

    async fn assign_address(
        &self,
        customer_id: &str,
        deriver: &(dyn AddressDeriver + Send + Sync),
    ) -> Result<AddressAssignment, AllocationError> {
        let mut tx = self.pool.begin().await?;
        let index = match addresses::reserve_next_index(customer_id, Utc::now(), &mut tx).await {
            Ok(index) => index,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                debug!("🏷️ {customer_id} was assigned an address concurrently. Using that one.");
                let mut conn = self.pool.acquire().await?;
                return addresses::fetch_assignment(customer_id, &mut conn).await?.ok_or_else(|| {
                    AllocationError::DatabaseError(format!("Address assignment for {customer_id} vanished"))
                });
            },
            Err(e) => return Err(e.into()),
        };
        let child = u32::try_from(index).map_err(|_| DerivationError::IndexOutOfRange(index))?;
        // Returning early drops the transaction, which releases the reserved index
        let address = deriver.derive_address(child)?;
        let assignment = addresses::set_address(customer_id, &address, &mut tx).await?;
        tx.commit().await?;
        Ok(assignment)
    }

    async fn fetch_active_assignments(&self, since: DateTime<Utc>) -> Result<Vec<AddressAssignment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let assignments = addresses::fetch_active_assignments(since, &mut conn).await?;
        Ok(assignments)
    }
}

impl ExchangeRates for SqliteDatabase {
    async fn fetch_last_rate(&self, currency: &str) -> Result<ExchangeRate, ExchangeRateError> {
        let mut conn = self.pool.acquire().await?;
        exchange_rates::fetch_last_rate(currency, &mut conn).await
    }

    async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        let mut conn = self.pool.acquire().await?;
        exchange_rates::set_exchange_rate(rate, &mut conn).await
    }
}

impl ProductCatalog for SqliteDatabase {
    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_active_products(&self) -> Result<Vec<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let products = products::fetch_active_products(&mut conn).await?;
        Ok(products)
    }

    async fn upsert_product(&self, id: Option<i64>, product: NewProduct) -> Result<Product, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::upsert_product(id, product, Utc::now(), &mut conn).await?;
        Ok(product)
    }
}
