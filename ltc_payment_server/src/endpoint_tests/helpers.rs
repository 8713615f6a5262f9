use std::{sync::Arc, time::Duration};

use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use log::debug;
use lpg_common::Cents;
use ltc_payment_engine::{
    address::AllocationMode,
    chain::ChainObserver,
    config::EngineConfig,
    db_types::NewProduct,
    events::EventProducers,
    rates::ExchangeRate,
    test_utils::{
        mocks::{FakeDeriver, ScriptedChainSource},
        prepare_env::{prepare_test_env, random_db_path},
    },
    uniquifier::AmountUniquifier,
    LedgerDatabase,
    OrderFlowApi,
    ProductCatalog,
    SqliteDatabase,
};
use serde::Serialize;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use super::mocks::MockRateFeed;
use crate::server::configure_routes;

pub const MERCHANT_ADDRESS: &str = "ltc1qmerchant0shared0address000000000000000";

pub type TestApi = OrderFlowApi<SqliteDatabase, ScriptedChainSource, MockRateFeed>;

/// A gateway on a fresh database, with a scripted chain and a mocked rate feed. The widget costs $25.00.
pub struct TestGateway {
    pub url: String,
    pub db: SqliteDatabase,
    pub chain: ScriptedChainSource,
    pub deriver: FakeDeriver,
    pub api: web::Data<TestApi>,
    pub product_id: i64,
}

impl TestGateway {
    /// Shared merchant address, with every amount offset by exactly 37 litoshi
    pub async fn shared(rates: MockRateFeed) -> Self {
        Self::new(AllocationMode::Shared(MERCHANT_ADDRESS.to_string()), FakeDeriver::default(), rates).await
    }

    pub async fn per_customer(rates: MockRateFeed) -> Self {
        let deriver = FakeDeriver::default();
        Self::new(AllocationMode::PerCustomer(Arc::new(deriver.clone())), deriver, rates).await
    }

    async fn new(mode: AllocationMode, deriver: FakeDeriver, rates: MockRateFeed) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error connecting to the test database");
        let product = db.upsert_product(None, NewProduct::new("Widget", Cents::from(2_500))).await.unwrap();
        let chain = ScriptedChainSource::default();
        let config = EngineConfig { uniquifier: AmountUniquifier::new(37, 37).unwrap(), ..Default::default() };
        let observer = ChainObserver::new(chain.clone(), config.min_confirmations, Duration::from_millis(500));
        let api = OrderFlowApi::new(db.clone(), mode, observer, rates, &config, EventProducers::default());
        Self { url, db, chain, deriver, api: web::Data::new(api), product_id: product.id }
    }

    pub async fn get(&self, path: &str) -> (StatusCode, String) {
        self.call(TestRequest::get().uri(path)).await
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> (StatusCode, String) {
        self.call(TestRequest::post().uri(path).set_json(body)).await
    }

    pub async fn post_empty(&self, path: &str) -> (StatusCode, String) {
        self.call(TestRequest::post().uri(path)).await
    }

    async fn call(&self, req: TestRequest) -> (StatusCode, String) {
        let app = App::new()
            .app_data(self.api.clone())
            .configure(configure_routes::<SqliteDatabase, ScriptedChainSource, MockRateFeed>);
        let service = test::init_service(app).await;
        debug!("Making request");
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
        (status, body)
    }

    pub async fn tear_down(mut self) {
        let _ = self.db.close().await;
        let _ = Sqlite::drop_database(&self.url).await;
    }
}

/// A rate feed quoting 1 LTC at $100.00, as often as it is asked.
pub fn hundred_dollar_feed() -> MockRateFeed {
    let mut feed = MockRateFeed::new();
    feed.expect_fetch_rate().returning(|currency| Ok(ExchangeRate::new(currency, Cents::from(10_000), None)));
    feed
}
