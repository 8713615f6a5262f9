//! Tunables shared by the order flow and the reconciler.
use std::time::Duration;

use lpg_common::{Cents, Litoshi};

use crate::{
    chain::{DEFAULT_MIN_CONFIRMATIONS, DEFAULT_REQUEST_TIMEOUT},
    rates::DEFAULT_RATE_MAX_AGE,
    uniquifier::AmountUniquifier,
};

pub const DEFAULT_ACTIVITY_WINDOW_HOURS: i64 = 72;
pub const DEFAULT_UNPAID_ORDER_TIMEOUT_HOURS: i64 = 24;
pub const DEFAULT_FIAT_CURRENCY: &str = "usd";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub min_confirmations: u64,
    /// Amount-matching tolerance. Clamped to at most 1 litoshi when used.
    pub match_tolerance: Litoshi,
    pub uniquifier: AmountUniquifier,
    /// Applied to every call to the chain and rate sources
    pub request_timeout: Duration,
    /// Per-customer addresses are polled if they were active this recently
    pub activity_window: chrono::Duration,
    pub unpaid_order_timeout: chrono::Duration,
    pub fiat_currency: String,
    pub rate_max_age: Duration,
    /// Fiat cents per LTC, used when no live or stored rate is available
    pub default_rate: Option<Cents>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            match_tolerance: Litoshi::default(),
            uniquifier: AmountUniquifier::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            activity_window: chrono::Duration::hours(DEFAULT_ACTIVITY_WINDOW_HOURS),
            unpaid_order_timeout: chrono::Duration::hours(DEFAULT_UNPAID_ORDER_TIMEOUT_HOURS),
            fiat_currency: DEFAULT_FIAT_CURRENCY.to_string(),
            rate_max_age: DEFAULT_RATE_MAX_AGE,
            default_rate: None,
        }
    }
}
