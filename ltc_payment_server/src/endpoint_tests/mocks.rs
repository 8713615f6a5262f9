use ltc_payment_engine::rates::{ExchangeRate, RateError, RateSource};
use mockall::mock;

mock! {
    pub RateFeed {}
    impl RateSource for RateFeed {
        async fn fetch_rate(&self, currency: &str) -> Result<ExchangeRate, RateError>;
    }
}
