//! # Exchange rates
//!
//! Product prices are in fiat; orders are in LTC. The [`RateProvider`] supplies the rate used to quote an order. It
//! asks a [`RateSource`] (e.g. [`CoinGeckoSource`]) for a fresh rate, caches the last good one in memory and in the
//! database, and falls back through the cache, the stored rate, and finally a configured default when the source is
//! unavailable.
mod coingecko;

use std::{
    fmt::Display,
    future::Future,
    sync::{Arc, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use lpg_common::{Cents, Litoshi, LITOSHI_PER_LTC};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

pub use coingecko::CoinGeckoSource;

use crate::traits::ExchangeRates;

pub const DEFAULT_RATE_MAX_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateError {
    #[error("No exchange rate is available for {0}")]
    RateUnavailable(String),
    #[error("The rate source did not respond in time")]
    Timeout,
    #[error("The rate source returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid exchange rate: {0}")]
    InvalidRate(String),
}

/// The fiat price of one LTC.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Lower-case fiat currency code, e.g. "usd"
    pub base_currency: String,
    /// Fiat cents per LTC
    pub rate: Cents,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(currency: &str, rate: Cents, updated_at: Option<DateTime<Utc>>) -> Self {
        let updated_at = updated_at.unwrap_or_else(Utc::now);
        Self { base_currency: currency.to_lowercase(), rate, updated_at }
    }

    /// Converts a fiat price into litoshi, rounding down.
    ///
    /// The conversion is pure integer arithmetic, so the same price and rate always give the same base amount.
    pub fn convert_to_litoshi(&self, price: Cents) -> Result<Litoshi, RateError> {
        if self.rate.value() <= 0 {
            return Err(RateError::InvalidRate(format!("{} is not a positive rate", self.rate)));
        }
        let value = i128::from(price.value()) * i128::from(LITOSHI_PER_LTC) / i128::from(self.rate.value());
        let value = i64::try_from(value).map_err(|_| RateError::InvalidRate(format!("{price} overflows at {self}")))?;
        Ok(Litoshi::from(value))
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.updated_at
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "1 LTC => {} {}", self.rate, self.base_currency.to_uppercase())
    }
}

/// An external price feed.
#[allow(async_fn_in_trait)]
pub trait RateSource {
    async fn fetch_rate(&self, currency: &str) -> Result<ExchangeRate, RateError>;
}

/// Quotes exchange rates with caching and fallbacks.
///
/// The in-memory cache is only an optimisation. It starts empty, and the stored rate is used in its place until the
/// source has answered once.
#[derive(Clone)]
pub struct RateProvider<B, R> {
    db: B,
    source: R,
    currency: String,
    max_age: Duration,
    timeout: Duration,
    default_rate: Option<Cents>,
    cache: Arc<RwLock<Option<ExchangeRate>>>,
}

impl<B, R> RateProvider<B, R> {
    pub fn new(db: B, source: R, currency: &str) -> Self {
        Self {
            db,
            source,
            currency: currency.to_lowercase(),
            max_age: DEFAULT_RATE_MAX_AGE,
            timeout: Duration::from_secs(15),
            default_rate: None,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_rate(mut self, rate: Option<Cents>) -> Self {
        self.default_rate = rate;
        self
    }

    pub fn currency(&self) -> &str {
        self.currency.as_str()
    }

    fn cached(&self) -> Option<ExchangeRate> {
        match self.cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update_cache(&self, rate: &ExchangeRate) {
        match self.cache.write() {
            Ok(mut guard) => *guard = Some(rate.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(rate.clone()),
        }
    }

    fn is_fresh(&self, rate: &ExchangeRate) -> bool {
        rate.age().to_std().map(|age| age <= self.max_age).unwrap_or(true)
    }
}

impl<B, R> RateProvider<B, R>
where
    B: ExchangeRates,
    R: RateSource,
{
    /// The rate to quote orders at.
    ///
    /// Fails with [`RateError::RateUnavailable`] only if the source is down *and* there is no cached, stored, or
    /// configured default rate.
    pub async fn current_rate(&self) -> Result<ExchangeRate, RateError> {
        if let Some(rate) = self.cached().filter(|r| self.is_fresh(r)) {
            trace!("💱️ Using cached rate {rate}");
            return Ok(rate);
        }
        match self.fetch_fresh().await {
            Ok(rate) => return Ok(rate),
            Err(e) => warn!("💱️ Could not fetch a fresh exchange rate. Falling back. {e}"),
        }
        if let Some(rate) = self.cached() {
            info!("💱️ Using the last known rate {rate} from {}", rate.updated_at);
            return Ok(rate);
        }
        match self.db.fetch_last_rate(&self.currency).await {
            Ok(rate) => {
                info!("💱️ Using the stored rate {rate} from {}", rate.updated_at);
                self.update_cache(&rate);
                return Ok(rate);
            },
            Err(e) => debug!("💱️ No stored rate. {e}"),
        }
        match self.default_rate {
            Some(cents) => {
                warn!("💱️ Using the configured default rate of {cents} {}", self.currency);
                Ok(ExchangeRate::new(&self.currency, cents, None))
            },
            None => {
                error!("💱️ No exchange rate is available for {}. Orders cannot be quoted.", self.currency);
                Err(RateError::RateUnavailable(self.currency.clone()))
            },
        }
    }

    async fn fetch_fresh(&self) -> Result<ExchangeRate, RateError> {
        let rate = with_timeout(self.timeout, self.source.fetch_rate(&self.currency)).await?;
        if rate.rate.value() <= 0 {
            return Err(RateError::InvalidRate(rate.to_string()));
        }
        debug!("💱️ Fetched fresh rate {rate}");
        self.update_cache(&rate);
        if let Err(e) = self.db.set_exchange_rate(&rate).await {
            warn!("💱️ Could not store the exchange rate. {e}");
        }
        Ok(rate)
    }
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, RateError>
where F: Future<Output = Result<T, RateError>> {
    tokio::time::timeout(timeout, fut).await.map_err(|_| RateError::Timeout)?
}
