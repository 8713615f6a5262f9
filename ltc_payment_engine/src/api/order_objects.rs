use chrono::{DateTime, Utc};
use lpg_common::{Cents, Litoshi};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderId, OrderStatusType},
    rates::ExchangeRate,
};

/// Everything a customer needs to pay for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInvoice {
    pub order_id: OrderId,
    pub customer_id: String,
    pub product_id: i64,
    pub target_address: String,
    /// The exact amount to send. On a shared address, this amount is what identifies the order.
    pub required_amount: Litoshi,
    pub price: Cents,
    pub rate: ExchangeRate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub txid: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Order> for PaymentStatus {
    fn from(order: &Order) -> Self {
        Self { order_id: order.id, status: order.status, txid: order.txid.clone(), paid_at: order.paid_at }
    }
}

impl PaymentStatus {
    pub fn is_paid(&self) -> bool {
        self.status == OrderStatusType::Paid
    }
}

/// The outcome of checking a transaction id that a customer says pays for their order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TxidVerification {
    /// The transaction was credited just now.
    Credited { status: PaymentStatus },
    /// The transaction has been credited before.
    AlreadyCredited { status: PaymentStatus },
    /// The transaction pays the order's address but is not deep enough yet. Try again later.
    Unconfirmed { confirmations: u64, required: u64 },
    /// The transaction pays the order's address, but not the amount the order asks for.
    AmountMismatch { expected: Litoshi, received: Litoshi },
    /// The transaction does not pay the order's address.
    NoPayment,
    NotFound,
    /// The chain data source could not be reached. Nothing has changed.
    Unavailable,
    /// The order is no longer waiting for a payment.
    OrderNotPending { status: PaymentStatus },
}
