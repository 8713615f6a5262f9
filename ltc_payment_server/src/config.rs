use std::{env, fmt::Display, str::FromStr, sync::Arc, time::Duration};

use log::*;
use lpg_common::{Cents, Litoshi, Secret};
use ltc_payment_engine::{
    address::{AllocationMode, XpubDeriver},
    config::{EngineConfig, DEFAULT_ACTIVITY_WINDOW_HOURS, DEFAULT_FIAT_CURRENCY, DEFAULT_UNPAID_ORDER_TIMEOUT_HOURS},
    matcher::MAX_TOLERANCE,
    uniquifier::{AmountUniquifier, DEFAULT_MAX_OFFSET, DEFAULT_MIN_OFFSET},
};

use crate::errors::ServerError;

const DEFAULT_LPG_HOST: &str = "127.0.0.1";
const DEFAULT_LPG_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/ltc_store.db";
const DEFAULT_ADDRESS_HRP: &str = "ltc";
const DEFAULT_MIN_CONFIRMATIONS: u64 = 1;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 45;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RATE_MAX_AGE_SECS: u64 = 60;
const DEFAULT_BLOCKCYPHER_URL: &str = "https://api.blockcypher.com/v1/ltc/main";
const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

/// Where customers send their payments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressConfig {
    /// Every order pays into the merchant's address and is identified by its amount.
    Shared { merchant_address: String },
    /// Every customer gets an address derived from the merchant's account-level extended public key.
    Derived { xpub: String, hrp: String },
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self::Shared { merchant_address: String::default() }
    }
}

impl AddressConfig {
    /// Builds the allocation mode. An empty merchant address is a fatal misconfiguration, but an invalid extended key
    /// is not: it is reported here and then only affects address allocation.
    pub fn allocation_mode(&self) -> Result<AllocationMode, ServerError> {
        match self {
            Self::Shared { merchant_address } if merchant_address.trim().is_empty() => Err(
                ServerError::ConfigurationError("LPG_MERCHANT_ADDRESS must be set in shared address mode".into()),
            ),
            Self::Shared { merchant_address } => Ok(AllocationMode::Shared(merchant_address.trim().to_string())),
            Self::Derived { xpub, hrp } => {
                let deriver = XpubDeriver::new(xpub, hrp);
                if let Err(e) = deriver.validate() {
                    error!("🪛️ Per-customer addresses cannot be derived. Orders will fail until LPG_XPUB is fixed. {e}");
                }
                Ok(AllocationMode::PerCustomer(Arc::new(deriver)))
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub address: AddressConfig,
    pub min_confirmations: u64,
    /// Amount-matching tolerance, 0 or 1 litoshi
    pub match_tolerance: Litoshi,
    pub uniquifier: AmountUniquifier,
    /// How often the reconciliation worker polls the chain
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub activity_window: chrono::Duration,
    /// The time before an unpaid order is considered expired and marked as such.
    pub unpaid_order_timeout: chrono::Duration,
    pub fiat_currency: String,
    pub default_rate: Option<Cents>,
    pub rate_max_age: Duration,
    pub blockcypher_url: String,
    pub blockcypher_token: Secret<String>,
    pub coingecko_url: String,
    /// If set, payment events are POSTed here.
    pub notify_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LPG_HOST.to_string(),
            port: DEFAULT_LPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            address: AddressConfig::default(),
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            match_tolerance: Litoshi::from(0),
            uniquifier: AmountUniquifier::default(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            activity_window: chrono::Duration::hours(DEFAULT_ACTIVITY_WINDOW_HOURS),
            unpaid_order_timeout: chrono::Duration::hours(DEFAULT_UNPAID_ORDER_TIMEOUT_HOURS),
            fiat_currency: DEFAULT_FIAT_CURRENCY.to_string(),
            default_rate: None,
            rate_max_age: Duration::from_secs(DEFAULT_RATE_MAX_AGE_SECS),
            blockcypher_url: DEFAULT_BLOCKCYPHER_URL.to_string(),
            blockcypher_token: Secret::default(),
            coingecko_url: DEFAULT_COINGECKO_URL.to_string(),
            notify_url: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LPG_HOST").ok().unwrap_or_else(|| DEFAULT_LPG_HOST.into());
        let port = parse_env("LPG_PORT", DEFAULT_LPG_PORT);
        let database_url = env::var("LPG_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ LPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let address = address_config_from_env();
        let min_confirmations = parse_env("LPG_MIN_CONFIRMATIONS", DEFAULT_MIN_CONFIRMATIONS);
        let tolerance = parse_env("LPG_MATCH_TOLERANCE", 0i64);
        if !(0..=MAX_TOLERANCE).contains(&tolerance) {
            warn!("🪛️ LPG_MATCH_TOLERANCE must be between 0 and {MAX_TOLERANCE} litoshi. {tolerance} will be clamped.");
        }
        let match_tolerance = Litoshi::from(tolerance.clamp(0, MAX_TOLERANCE));
        let uniquifier = uniquifier_from_env();
        let poll_interval = Duration::from_secs(parse_env("LPG_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS).max(1));
        let request_timeout = Duration::from_secs(parse_env("LPG_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS));
        let activity_window = chrono::Duration::hours(parse_env("LPG_ACTIVITY_WINDOW", DEFAULT_ACTIVITY_WINDOW_HOURS));
        let unpaid_order_timeout =
            chrono::Duration::hours(parse_env("LPG_UNPAID_ORDER_TIMEOUT", DEFAULT_UNPAID_ORDER_TIMEOUT_HOURS));
        let fiat_currency = env::var("LPG_FIAT_CURRENCY")
            .map(|s| s.trim().to_lowercase())
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_FIAT_CURRENCY.to_string());
        let default_rate = env::var("LPG_DEFAULT_RATE").ok().and_then(|s| {
            s.parse::<Cents>()
                .map_err(|e| warn!("🪛️ Ignoring invalid LPG_DEFAULT_RATE ({s}). {e}"))
                .ok()
                .filter(|c| c.value() > 0)
        });
        let rate_max_age = Duration::from_secs(parse_env("LPG_RATE_MAX_AGE", DEFAULT_RATE_MAX_AGE_SECS));
        let blockcypher_url = env::var("LPG_BLOCKCYPHER_URL").ok().unwrap_or_else(|| DEFAULT_BLOCKCYPHER_URL.into());
        let blockcypher_token = Secret::new(env::var("LPG_BLOCKCYPHER_TOKEN").ok().unwrap_or_default());
        let coingecko_url = env::var("LPG_COINGECKO_URL").ok().unwrap_or_else(|| DEFAULT_COINGECKO_URL.into());
        let notify_url = env::var("LPG_NOTIFY_URL").ok().filter(|s| !s.trim().is_empty());
        if notify_url.is_none() {
            info!("🪛️ LPG_NOTIFY_URL is not set. Payment events will only be logged.");
        }
        Self {
            host,
            port,
            database_url,
            address,
            min_confirmations,
            match_tolerance,
            uniquifier,
            poll_interval,
            request_timeout,
            activity_window,
            unpaid_order_timeout,
            fiat_currency,
            default_rate,
            rate_max_age,
            blockcypher_url,
            blockcypher_token,
            coingecko_url,
            notify_url,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            min_confirmations: self.min_confirmations,
            match_tolerance: self.match_tolerance,
            uniquifier: self.uniquifier,
            request_timeout: self.request_timeout,
            activity_window: self.activity_window,
            unpaid_order_timeout: self.unpaid_order_timeout,
            fiat_currency: self.fiat_currency.clone(),
            rate_max_age: self.rate_max_age,
            default_rate: self.default_rate,
        }
    }
}

fn address_config_from_env() -> AddressConfig {
    let mode = env::var("LPG_ADDRESS_MODE").map(|s| s.trim().to_lowercase()).unwrap_or_else(|_| "shared".into());
    match mode.as_str() {
        "derived" | "per-customer" | "per_customer" => {
            let xpub = env::var("LPG_XPUB").ok().unwrap_or_else(|| {
                error!("🪛️ LPG_XPUB is not set. Per-customer addresses cannot be derived without it.");
                String::default()
            });
            let hrp = env::var("LPG_ADDRESS_HRP").ok().unwrap_or_else(|| DEFAULT_ADDRESS_HRP.into());
            info!("🪛️ Every customer gets their own address, with prefix {hrp}");
            AddressConfig::Derived { xpub, hrp }
        },
        other => {
            if other != "shared" {
                warn!("🪛️ Unknown LPG_ADDRESS_MODE '{other}'. Using the shared merchant address.");
            }
            let merchant_address = env::var("LPG_MERCHANT_ADDRESS").ok().unwrap_or_else(|| {
                error!("🪛️ LPG_MERCHANT_ADDRESS is not set. Please set it to the address that receives payments.");
                String::default()
            });
            AddressConfig::Shared { merchant_address }
        },
    }
}

fn uniquifier_from_env() -> AmountUniquifier {
    let min = parse_env("LPG_OFFSET_MIN", DEFAULT_MIN_OFFSET);
    let max = parse_env("LPG_OFFSET_MAX", DEFAULT_MAX_OFFSET);
    AmountUniquifier::new(min, max).unwrap_or_else(|e| {
        warn!("🪛️ {e} in LPG_OFFSET_MIN/LPG_OFFSET_MAX. Using {DEFAULT_MIN_OFFSET}..={DEFAULT_MAX_OFFSET} instead.");
        AmountUniquifier::default()
    })
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}
