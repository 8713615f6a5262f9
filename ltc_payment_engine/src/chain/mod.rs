//! # Blockchain observation
//!
//! The engine does not index the chain itself. It consumes a [`ChainDataSource`] (an indexing service such as
//! BlockCypher) and turns what it reports into [`PaymentSighting`]s through the [`ChainObserver`], which owns the
//! confirmation policy, incoming-value filtering, and failure handling.
mod blockcypher;
mod observer;

use lpg_common::Litoshi;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use blockcypher::BlockCypherSource;
pub use observer::{ChainObserver, TransactionObservation, DEFAULT_MIN_CONFIRMATIONS, DEFAULT_REQUEST_TIMEOUT};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainDataError {
    #[error("The chain data source is unavailable: {0}")]
    Unavailable(String),
    #[error("The chain data source returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("The chain data source did not respond in time")]
    Timeout,
}

/// A single transaction output, as reported by the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub value: Litoshi,
}

/// How deep a transaction is. Some sources report confirmations directly; others only report the block height the
/// transaction was mined in (`None` while it is still in the mempool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
    Confirmations(u64),
    BlockHeight(Option<u64>),
}

/// A transaction that touches an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressActivity {
    pub txid: String,
    pub outputs: Vec<TxOutput>,
    pub depth: Depth,
}

/// A normalised observation of a payment into an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentSighting {
    pub txid: String,
    pub address: String,
    /// The sum of all the transaction's outputs paying `address`
    pub value: Litoshi,
    pub confirmations: u64,
}

impl PaymentSighting {
    pub fn new(txid: &str, address: &str, value: Litoshi, confirmations: u64) -> Self {
        Self { txid: txid.to_string(), address: address.to_string(), value, confirmations }
    }
}

/// The external blockchain indexing service.
#[allow(async_fn_in_trait)]
pub trait ChainDataSource {
    /// The height of the current chain tip.
    async fn chain_height(&self) -> Result<u64, ChainDataError>;

    /// Recent transactions involving `address`, including unconfirmed ones.
    async fn fetch_address_activity(&self, address: &str) -> Result<Vec<AddressActivity>, ChainDataError>;

    /// A single transaction, or `None` if the source does not know it.
    async fn fetch_transaction(&self, txid: &str) -> Result<Option<AddressActivity>, ChainDataError>;
}
