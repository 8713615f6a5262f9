use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use lpg_common::{Cents, Litoshi};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and no matching payment has been credited yet.
    Pending,
    /// A payment has been credited against the order. Terminal.
    Paid,
    /// The order was not paid within the unpaid-order timeout. Terminal.
    Expired,
    /// The order has been cancelled by the customer or an operator. Terminal.
    Cancelled,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Illegal order status transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
}

impl OrderStatusType {
    /// The single source of truth for legal order status changes. Only a `Pending` order can move, and only to one of
    /// the terminal states.
    pub fn transition_to(self, to: OrderStatusType) -> Result<OrderStatusType, IllegalTransition> {
        use OrderStatusType::*;
        match (self, to) {
            (Pending, Paid | Expired | Cancelled) => Ok(to),
            (from, to) => Err(IllegalTransition { from, to }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatusType::Pending)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Expired => write!(f, "Expired"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Expired" => Ok(Self::Expired),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for OrderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse::<i64>().map(Self)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------        Order       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    pub product_id: i64,
    pub required_amount: Litoshi,
    pub target_address: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub txid: Option<String>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatusType::Pending
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: String,
    pub product_id: i64,
    /// The uniquified amount the customer has been asked to pay
    pub required_amount: Litoshi,
    pub target_address: String,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(customer_id: &str, product_id: i64, required_amount: Litoshi, target_address: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            product_id,
            required_amount,
            target_address: target_address.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Override the creation time. Matching is oldest-first on this field, so tests use it to pin ordering.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------  CreditedTransaction  ---------------------------------------------------------
/// De-duplication record for a payment that has been accepted. There is exactly one of these for every
/// `(address, txid, value)` triple that has ever been credited.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CreditedTransaction {
    pub id: i64,
    pub address: String,
    pub txid: String,
    pub value: Litoshi,
    pub customer_id: String,
    pub order_id: Option<OrderId>,
    pub confirmations: i64,
    pub credited_at: DateTime<Utc>,
}

/// What a credit is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditTarget {
    /// Shared-address mode: the payment settles a specific order.
    Order(OrderId),
    /// Per-customer address mode: the payment is added to the customer's balance.
    Customer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredit {
    pub target: CreditTarget,
    pub address: String,
    pub txid: String,
    pub value: Litoshi,
    pub confirmations: u64,
}

impl NewCredit {
    pub fn for_order(order_id: OrderId, address: &str, txid: &str, value: Litoshi, confirmations: u64) -> Self {
        Self {
            target: CreditTarget::Order(order_id),
            address: address.to_string(),
            txid: txid.to_string(),
            value,
            confirmations,
        }
    }

    pub fn for_customer(customer_id: &str, address: &str, txid: &str, value: Litoshi, confirmations: u64) -> Self {
        Self {
            target: CreditTarget::Customer(customer_id.to_string()),
            address: address.to_string(),
            txid: txid.to_string(),
            value,
            confirmations,
        }
    }
}

/// The outcome of [`crate::LedgerDatabase::credit`]. None of these are errors: a storage failure is reported through
/// `LedgerError` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditResult {
    /// The payment was recorded and the order marked as paid.
    OrderPaid { order: Order, credit: CreditedTransaction },
    /// The payment was recorded and added to the customer's balance.
    BalanceCredited { balance: Balance, credit: CreditedTransaction },
    /// This `(address, txid, value)` has been credited before. Nothing was changed.
    AlreadyCredited,
    /// The target order is no longer pending. Nothing was recorded, so the payment stays eligible.
    OrderNotPending(Order),
}

impl CreditResult {
    pub fn is_new_credit(&self) -> bool {
        matches!(self, CreditResult::OrderPaid { .. } | CreditResult::BalanceCredited { .. })
    }
}

//--------------------------------------        Balance        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Balance {
    pub customer_id: String,
    pub amount: Litoshi,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn zero(customer_id: &str) -> Self {
        Self { customer_id: customer_id.to_string(), amount: Litoshi::default(), updated_at: Utc::now() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitResult {
    Debited(Balance),
    InsufficientFunds,
}

/// The outcome of paying a pending order out of the customer's balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentFromBalance {
    Paid { order: Order, balance: Balance },
    InsufficientFunds,
    OrderNotPending(Order),
}

//--------------------------------------   AddressAssignment   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AddressAssignment {
    pub customer_id: String,
    pub derivation_index: i64,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Cents,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Cents,
    pub active: bool,
}

impl NewProduct {
    pub fn new(name: &str, price: Cents) -> Self {
        Self { name: name.to_string(), description: None, price, active: true }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}
