use std::fmt::Display;

use lpg_common::Litoshi;
use ltc_payment_engine::db_types::{Order, OrderStatusType, PaymentFromBalance};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub customer_id: String,
    pub product_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxidSubmission {
    pub txid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub customer_id: String,
    pub balance: Litoshi,
    /// The balance in LTC, for display
    pub balance_ltc: String,
}

impl BalanceResponse {
    pub fn new(customer_id: String, balance: Litoshi) -> Self {
        Self { customer_id, balance, balance_ltc: balance.to_ltc_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositAddressResponse {
    pub customer_id: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum PayFromBalanceResponse {
    Paid { order: Order, balance: Litoshi },
    InsufficientFunds,
    OrderNotPending { status: OrderStatusType },
}

impl From<PaymentFromBalance> for PayFromBalanceResponse {
    fn from(value: PaymentFromBalance) -> Self {
        match value {
            PaymentFromBalance::Paid { order, balance } => Self::Paid { order, balance: balance.amount },
            PaymentFromBalance::InsufficientFunds => Self::InsufficientFunds,
            PaymentFromBalance::OrderNotPending(order) => Self::OrderNotPending { status: order.status },
        }
    }
}
