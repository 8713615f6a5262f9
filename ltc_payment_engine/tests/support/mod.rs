#![allow(dead_code)]
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use log::*;
use lpg_common::Cents;
use ltc_payment_engine::{
    address::AllocationMode,
    chain::ChainObserver,
    config::EngineConfig,
    db_types::NewProduct,
    events::{EventHandlers, EventHooks, OrderAnnulledEvent, OrderPaidEvent, PaymentCreditedEvent},
    test_utils::{
        mocks::{FakeDeriver, FixedRateSource, ScriptedChainSource},
        prepare_env::{prepare_test_env, random_db_path},
    },
    LedgerDatabase,
    OrderFlowApi,
    ProductCatalog,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const SHARED_ADDRESS: &str = "ltc1qmerchant0shared0address000000000000000";
/// $100.00 per LTC
pub const RATE: i64 = 10_000;
/// $25.00
pub const WIDGET_PRICE: i64 = 2_500;

pub type TestApi = OrderFlowApi<SqliteDatabase, ScriptedChainSource, FixedRateSource>;

/// Every event the hooks received, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    pub paid: Arc<Mutex<Vec<OrderPaidEvent>>>,
    pub credited: Arc<Mutex<Vec<PaymentCreditedEvent>>>,
    pub annulled: Arc<Mutex<Vec<OrderAnnulledEvent>>>,
}

impl EventLog {
    pub fn paid(&self) -> Vec<OrderPaidEvent> {
        self.paid.lock().unwrap().clone()
    }

    pub fn credited(&self) -> Vec<PaymentCreditedEvent> {
        self.credited.lock().unwrap().clone()
    }

    pub fn annulled(&self) -> Vec<OrderAnnulledEvent> {
        self.annulled.lock().unwrap().clone()
    }

    fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let paid = self.paid.clone();
        hooks.on_order_paid(move |ev| {
            paid.lock().unwrap().push(ev);
            Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let credited = self.credited.clone();
        hooks.on_payment_credited(move |ev| {
            credited.lock().unwrap().push(ev);
            Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let annulled = self.annulled.clone();
        hooks.on_order_annulled(move |ev| {
            annulled.lock().unwrap().push(ev);
            Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        hooks
    }
}

pub struct TestSystem {
    pub url: String,
    pub db: SqliteDatabase,
    pub chain: ScriptedChainSource,
    pub rates: FixedRateSource,
    pub deriver: FakeDeriver,
    pub events: EventLog,
    pub api: TestApi,
    pub product_id: i64,
    config: EngineConfig,
}

impl TestSystem {
    pub async fn shared(config: EngineConfig) -> Self {
        let deriver = FakeDeriver::default();
        Self::new(AllocationMode::Shared(SHARED_ADDRESS.to_string()), deriver, config).await
    }

    pub async fn per_customer(config: EngineConfig) -> Self {
        let deriver = FakeDeriver::default();
        Self::new(AllocationMode::PerCustomer(Arc::new(deriver.clone())), deriver, config).await
    }

    async fn new(mode: AllocationMode, deriver: FakeDeriver, config: EngineConfig) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 25).await.expect("Error connecting to the test database");
        let product = db
            .upsert_product(None, NewProduct::new("Widget", Cents::from(WIDGET_PRICE)))
            .await
            .expect("Error seeding the product catalog");
        let chain = ScriptedChainSource::default();
        let rates = FixedRateSource::new(Cents::from(RATE));
        let events = EventLog::default();
        let api = build_api(&db, mode, &chain, &rates, &config, &events).await;
        Self { url, db, chain, rates, deriver, events, api, product_id: product.id, config }
    }

    /// A second API instance on the same database, as if the process had restarted.
    pub async fn restart(&self, mode: AllocationMode) -> TestApi {
        let db = SqliteDatabase::new_with_url(&self.url, 25).await.expect("Error reconnecting to the test database");
        build_api(&db, mode, &self.chain, &self.rates, &self.config, &self.events).await
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        let _ = Sqlite::drop_database(&self.url).await;
    }
}

async fn build_api(
    db: &SqliteDatabase,
    mode: AllocationMode,
    chain: &ScriptedChainSource,
    rates: &FixedRateSource,
    config: &EngineConfig,
    events: &EventLog,
) -> TestApi {
    let handlers = EventHandlers::new(64, events.hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let observer = ChainObserver::new(chain.clone(), config.min_confirmations, Duration::from_millis(500));
    OrderFlowApi::new(db.clone(), mode, observer, rates.clone(), config, producers)
}

/// Hex txids, as the chain source reports them
pub fn txid(n: u64) -> String {
    format!("{n:064x}")
}

/// Waits (briefly) for the asynchronous event handlers to catch up.
pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A database on its own, for tests that exercise the ledger directly.
pub async fn ledger() -> (String, SqliteDatabase) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 25).await.expect("Error connecting to the test database");
    (url, db)
}

pub async fn drop_ledger(url: &str, mut db: SqliteDatabase) {
    let _ = db.close().await;
    let _ = Sqlite::drop_database(url).await;
}
