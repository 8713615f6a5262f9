use chrono::Duration;
use lpg_common::Litoshi;
use thiserror::Error;

use crate::{
    db_types::{
        Balance,
        CreditResult,
        CreditedTransaction,
        DebitResult,
        IllegalTransition,
        NewCredit,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        PaymentFromBalance,
    },
    traits::{AddressAssignments, ExchangeRates, ProductCatalog},
};

/// This trait defines the highest level of behaviour for backends supporting the payment engine.
///
/// This behaviour includes:
/// * Creating and querying orders.
/// * Crediting observed payments, exactly once, to an order or a customer balance.
/// * Spending customer balances on orders.
/// * Order expiry and cancellation.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone + AddressAssignments + ExchangeRates + ProductCatalog {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order with status `Pending`.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, LedgerError>;

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, LedgerError>;

    /// Pending orders paying into `address`, oldest first (by `created_at`, then `id`).
    async fn fetch_pending_orders_for_address(&self, address: &str) -> Result<Vec<Order>, LedgerError>;

    /// Pending orders for the customer, oldest first (by `created_at`, then `id`).
    async fn fetch_pending_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, LedgerError>;

    /// Distinct addresses that at least one pending order is waiting on.
    async fn fetch_pending_order_addresses(&self) -> Result<Vec<String>, LedgerError>;

    /// Applies a credit in a single atomic transaction.
    ///
    /// 1. The `(address, txid, value)` triple is inserted into the credited transactions table. If the storage engine
    ///    rejects it as a duplicate, nothing else happens and [`CreditResult::AlreadyCredited`] is returned.
    /// 2. The effect is applied: the target order is marked as `Paid` (recording the txid), or the value is added to the
    ///    target customer's balance.
    /// 3. If the target order is no longer `Pending`, the whole transaction is rolled back and
    ///    [`CreditResult::OrderNotPending`] is returned. The payment is *not* recorded, so it is never swallowed.
    ///
    /// Any other failure aborts the transaction and is returned as an error. Callers publish events only after this
    /// method has returned a new credit.
    async fn credit(&self, credit: NewCredit) -> Result<CreditResult, LedgerError>;

    async fn credited_transactions_for_address(&self, address: &str)
        -> Result<Vec<CreditedTransaction>, LedgerError>;

    async fn fetch_credited_transaction(&self, txid: &str) -> Result<Option<CreditedTransaction>, LedgerError>;

    /// The customer's current balance. Customers that have never been credited have a zero balance.
    async fn fetch_balance(&self, customer_id: &str) -> Result<Balance, LedgerError>;

    /// Atomically subtracts `amount` from the customer's balance if, and only if, the balance covers it.
    ///
    /// This is a single conditional update, so concurrent debits can never drive a balance negative.
    async fn debit_for_purchase(&self, customer_id: &str, amount: Litoshi) -> Result<DebitResult, LedgerError>;

    /// Pays a pending order out of its customer's balance. The debit and the `Pending -> Paid` transition are a single
    /// transaction.
    async fn pay_order_from_balance(&self, order_id: OrderId) -> Result<PaymentFromBalance, LedgerError>;

    /// Moves a `Pending` order to `Expired` or `Cancelled`.
    ///
    /// Returns [`LedgerError::IllegalTransition`] if the order is not pending, or if `new_status` is not one of the two
    /// annulled states.
    async fn cancel_or_expire_order(
        &self,
        order_id: OrderId,
        new_status: OrderStatusType,
    ) -> Result<Order, LedgerError>;

    /// Marks pending orders that were created longer than `limit` ago as `Expired`.
    ///
    /// The result is the list of orders that were expired.
    async fn expire_old_orders(&self, limit: Duration) -> Result<Vec<Order>, LedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("{0}")]
    IllegalTransition(#[from] IllegalTransition),
    #[error("Cannot credit a non-positive value of {0}")]
    InvalidCreditValue(Litoshi),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
