use std::{collections::HashMap, time::Duration};

use log::*;
use lpg_common::Cents;
use reqwest::Client;

use crate::rates::{ExchangeRate, RateError, RateSource};

pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";
const COIN_ID: &str = "litecoin";

/// [`RateSource`] backed by CoinGecko's `simple/price` endpoint.
#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RateError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RateError::RateUnavailable(format!("Could not create HTTP client. {e}")))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

/// `{"litecoin": {"usd": 85.12}}`
type PriceResponse = HashMap<String, HashMap<String, f64>>;

/// The feed reports a float. It is converted to cents exactly once, here; nothing downstream sees floating point.
fn parse_price(response: &PriceResponse, currency: &str) -> Result<Cents, RateError> {
    let price = response
        .get(COIN_ID)
        .and_then(|prices| prices.get(currency))
        .copied()
        .ok_or_else(|| RateError::InvalidResponse(format!("No {currency} price for {COIN_ID}")))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(RateError::InvalidResponse(format!("Price {price} is not a positive number")));
    }
    #[allow(clippy::cast_possible_truncation)]
    let cents = (price * 100.0).round() as i64;
    if cents <= 0 {
        return Err(RateError::InvalidResponse(format!("Price {price} is below one cent")));
    }
    Ok(Cents::from(cents))
}

impl RateSource for CoinGeckoSource {
    async fn fetch_rate(&self, currency: &str) -> Result<ExchangeRate, RateError> {
        let currency = currency.to_lowercase();
        let url = format!("{}/simple/price", self.base_url);
        trace!("💱️ GET {url}");
        let response = self
            .client
            .get(&url)
            .query(&[("ids", COIN_ID), ("vs_currencies", currency.as_str())])
            .send()
            .await
            .map_err(|e| RateError::RateUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RateError::RateUnavailable(format!("{url} returned {}", response.status())));
        }
        let prices = response.json::<PriceResponse>().await.map_err(|e| RateError::InvalidResponse(e.to_string()))?;
        let cents = parse_price(&prices, &currency)?;
        Ok(ExchangeRate::new(&currency, cents, None))
    }
}
