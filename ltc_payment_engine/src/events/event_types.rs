use lpg_common::Litoshi;
use serde::{Deserialize, Serialize};

use crate::db_types::{Balance, CreditedTransaction, Order, OrderId, OrderStatusType};

/// An order moved to `Paid`, either by an on-chain payment or out of the customer's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    /// The paying transaction. `None` when the order was paid from the customer's balance.
    pub txid: Option<String>,
    pub amount: Litoshi,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        let txid = order.txid.clone();
        let amount = order.required_amount;
        Self { order, txid, amount }
    }
}

/// An on-chain payment was credited, to an order or to a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCreditedEvent {
    pub customer_id: String,
    pub order_id: Option<OrderId>,
    pub txid: String,
    pub address: String,
    pub amount: Litoshi,
    /// The customer's balance after the credit, for deposits
    pub balance: Option<Litoshi>,
}

impl PaymentCreditedEvent {
    pub fn for_order(credit: &CreditedTransaction) -> Self {
        Self {
            customer_id: credit.customer_id.clone(),
            order_id: credit.order_id,
            txid: credit.txid.clone(),
            address: credit.address.clone(),
            amount: credit.value,
            balance: None,
        }
    }

    pub fn for_deposit(credit: &CreditedTransaction, balance: &Balance) -> Self {
        Self { balance: Some(balance.amount), ..Self::for_order(credit) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

/// Everything the engine publishes, for handlers that want a single stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    PaymentCredited(PaymentCreditedEvent),
    OrderAnnulled(OrderAnnulledEvent),
}
