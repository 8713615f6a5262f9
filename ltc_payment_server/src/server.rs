use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use ltc_payment_engine::{
    chain::{BlockCypherSource, ChainDataSource, ChainObserver},
    events::EventHandlers,
    rates::{CoinGeckoSource, RateSource},
    LedgerDatabase,
    OrderFlowApi,
    ProductCatalog,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    notifier::WebhookNotifier,
    reconciliation_worker::start_reconciliation_worker,
    routes::{
        health,
        BalanceRoute,
        CancelOrderRoute,
        CheckPaymentRoute,
        DepositAddressRoute,
        ExchangeRateRoute,
        NewOrderRoute,
        OrderByIdRoute,
        PayFromBalanceRoute,
        SubmitTxidRoute,
    },
};

/// The order flow API as the server runs it: SQLite storage, BlockCypher for the chain, and CoinGecko for rates.
pub type GatewayApi = OrderFlowApi<SqliteDatabase, BlockCypherSource, CoinGeckoSource>;

const EVENT_BUFFER_SIZE: usize = 25;
/// Open orders assumed when logging the offset collision bound at startup
const TYPICAL_OPEN_ORDERS: u64 = 20;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Database migration failed. {e}")))?;
    let api = build_gateway_api(&config, db).await?;
    api.log_collision_bound(TYPICAL_OPEN_ORDERS);
    match api.db().fetch_active_products().await {
        Ok(products) if products.is_empty() => warn!("🚀️ The product catalog is empty. No orders can be placed."),
        Ok(products) => info!("🚀️ {} products are for sale", products.len()),
        Err(e) => warn!("🚀️ Could not read the product catalog. {e}"),
    }
    let _reconciler = start_reconciliation_worker(api.clone(), config.poll_interval);
    let _expiry = start_expiry_worker(api.clone(), config.unpaid_order_timeout);
    let srv = create_server_instance(&config, api)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Wires the engine together from the configuration: allocation mode, chain observer, rate source, and the
/// notification hooks.
pub async fn build_gateway_api(config: &ServerConfig, db: SqliteDatabase) -> Result<GatewayApi, ServerError> {
    let mode = config.address.allocation_mode()?;
    info!("🚀️ Address allocation mode: {mode:?}");
    let token = Some(config.blockcypher_token.reveal().clone()).filter(|t| !t.is_empty());
    let chain = BlockCypherSource::new(&config.blockcypher_url, token, config.request_timeout)
        .map_err(|e| ServerError::InitializeError(format!("Could not create the chain data client. {e}")))?;
    let observer = ChainObserver::new(chain, config.min_confirmations, config.request_timeout);
    let rates = CoinGeckoSource::new(&config.coingecko_url, config.request_timeout)
        .map_err(|e| ServerError::InitializeError(format!("Could not create the exchange rate client. {e}")))?;
    let notifier = WebhookNotifier::new(config.notify_url.clone(), config.request_timeout)?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, notifier.hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    Ok(OrderFlowApi::new(db, mode, observer, rates, &config.engine_config(), producers))
}

pub fn create_server_instance(config: &ServerConfig, api: GatewayApi) -> Result<Server, ServerError> {
    let api = web::Data::new(api);
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("lpg::access_log"))
            .app_data(api.clone())
            .configure(configure_routes::<SqliteDatabase, BlockCypherSource, CoinGeckoSource>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers every route for an order flow API with the given storage, chain source and rate source.
pub fn configure_routes<B, C, R>(cfg: &mut web::ServiceConfig)
where
    B: LedgerDatabase + 'static,
    C: ChainDataSource + 'static,
    R: RateSource + 'static,
{
    cfg.service(health)
        .service(NewOrderRoute::<B, C, R>::new())
        .service(OrderByIdRoute::<B, C, R>::new())
        .service(CheckPaymentRoute::<B, C, R>::new())
        .service(SubmitTxidRoute::<B, C, R>::new())
        .service(PayFromBalanceRoute::<B, C, R>::new())
        .service(CancelOrderRoute::<B, C, R>::new())
        .service(BalanceRoute::<B, C, R>::new())
        .service(DepositAddressRoute::<B, C, R>::new())
        .service(ExchangeRateRoute::<B, C, R>::new());
}
