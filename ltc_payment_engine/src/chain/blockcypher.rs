//! [`ChainDataSource`] backed by the BlockCypher REST API (`https://api.blockcypher.com/v1/ltc/main`).
use std::{collections::BTreeMap, time::Duration};

use log::*;
use lpg_common::Litoshi;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

use crate::chain::{AddressActivity, ChainDataError, ChainDataSource, Depth, TxOutput};

pub const BLOCKCYPHER_LTC_MAINNET: &str = "https://api.blockcypher.com/v1/ltc/main";
/// Number of transaction references requested per address lookup
const TXREF_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct BlockCypherSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BlockCypherSource {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ChainDataError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainDataError::Unavailable(format!("Could not create HTTP client. {e}")))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), token })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>, ChainDataError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            req = req.query(&[("token", token)]);
        }
        trace!("🔭️ GET {url}");
        let response = req.send().await.map_err(|e| ChainDataError::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let value = response.json::<T>().await.map_err(|e| ChainDataError::InvalidResponse(e.to_string()))?;
                Ok(Some(value))
            },
            s => Err(ChainDataError::Unavailable(format!("{url} returned {s}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChainInfo {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(default)]
    txrefs: Vec<TxRef>,
    #[serde(default)]
    unconfirmed_txrefs: Vec<TxRef>,
}

/// One input or output of a transaction that involves the queried address
#[derive(Debug, Deserialize)]
struct TxRef {
    tx_hash: String,
    /// -1 when this reference is an output
    tx_input_n: i64,
    value: u64,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct TxInfo {
    hash: String,
    #[serde(default)]
    confirmations: u64,
    #[serde(default)]
    outputs: Vec<TxInfoOutput>,
}

#[derive(Debug, Deserialize)]
struct TxInfoOutput {
    value: u64,
    #[serde(default)]
    addresses: Option<Vec<String>>,
}

fn litoshi(value: u64) -> Result<Litoshi, ChainDataError> {
    Litoshi::try_from(value).map_err(|e| ChainDataError::InvalidResponse(e.to_string()))
}

/// Groups the address's output references by transaction. Input references (money leaving the address) are dropped.
fn address_activity(address: &str, info: AddressInfo) -> Result<Vec<AddressActivity>, ChainDataError> {
    let mut by_tx = BTreeMap::<String, AddressActivity>::new();
    for txref in info.txrefs.into_iter().chain(info.unconfirmed_txrefs) {
        if txref.tx_input_n != -1 {
            continue;
        }
        let value = litoshi(txref.value)?;
        let entry = by_tx.entry(txref.tx_hash.clone()).or_insert_with(|| AddressActivity {
            txid: txref.tx_hash,
            outputs: Vec::new(),
            depth: Depth::Confirmations(txref.confirmations),
        });
        entry.outputs.push(TxOutput { address: address.to_string(), value });
    }
    Ok(by_tx.into_values().collect())
}

fn transaction_activity(tx: TxInfo) -> Result<AddressActivity, ChainDataError> {
    let mut outputs = Vec::with_capacity(tx.outputs.len());
    for output in tx.outputs {
        // Multisig and OP_RETURN outputs cannot pay a single address
        if let Some([address]) = output.addresses.as_deref() {
            outputs.push(TxOutput { address: address.clone(), value: litoshi(output.value)? });
        }
    }
    Ok(AddressActivity { txid: tx.hash, outputs, depth: Depth::Confirmations(tx.confirmations) })
}

impl ChainDataSource for BlockCypherSource {
    async fn chain_height(&self) -> Result<u64, ChainDataError> {
        let info = self
            .get::<ChainInfo>("", &[])
            .await?
            .ok_or_else(|| ChainDataError::InvalidResponse("Chain endpoint not found".into()))?;
        Ok(info.height)
    }

    async fn fetch_address_activity(&self, address: &str) -> Result<Vec<AddressActivity>, ChainDataError> {
        let path = format!("/addrs/{address}");
        match self.get::<AddressInfo>(&path, &[("limit", TXREF_LIMIT.to_string())]).await? {
            Some(info) => address_activity(address, info),
            // An address that has never been used is unknown to the indexer
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Option<AddressActivity>, ChainDataError> {
        let path = format!("/txs/{txid}");
        self.get::<TxInfo>(&path, &[]).await?.map(transaction_activity).transpose()
    }
}
