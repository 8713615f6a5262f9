use thiserror::Error;

use crate::{
    address::AllocationError,
    db_types::{IllegalTransition, OrderId},
    rates::RateError,
    traits::LedgerError,
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Product {0} does not exist or is not for sale")]
    ProductNotFound(i64),
    #[error("Product {0} has a price that converts to nothing at the current rate")]
    InvalidPrice(i64),
    #[error("{0} is not a valid transaction id")]
    InvalidTxid(String),
    #[error("{0}")]
    IllegalTransition(#[from] IllegalTransition),
    #[error("Could not allocate a payment address. {0}")]
    AddressAllocation(#[from] AllocationError),
    #[error("Could not quote the order. {0}")]
    ExchangeRate(#[from] RateError),
}

impl From<LedgerError> for OrderFlowError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OrderNotFound(id) => OrderFlowError::OrderNotFound(id),
            LedgerError::IllegalTransition(t) => OrderFlowError::IllegalTransition(t),
            LedgerError::DatabaseError(s) => OrderFlowError::DatabaseError(s),
            LedgerError::InvalidCreditValue(_) => OrderFlowError::DatabaseError(e.to_string()),
        }
    }
}
