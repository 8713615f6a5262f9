//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every handler here is async, and everything they call (database,
//! chain source, rate source) is awaited, so a slow block explorer never ties up a worker thread.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use ltc_payment_engine::{chain::ChainDataSource, db_types::OrderId, rates::RateSource, LedgerDatabase, OrderFlowApi};

use crate::{
    data_objects::{
        BalanceResponse,
        DepositAddressResponse,
        NewOrderRequest,
        PayFromBalanceResponse,
        TxidSubmission,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(new_order => Post "/order" impl LedgerDatabase, ChainDataSource, RateSource);
/// Quotes a product in LTC and opens an order for it.
///
/// The response is the invoice: the address to pay, the exact amount in litoshi, and the rate it was quoted at. On a
/// shared merchant address the amount is what identifies the order, so the customer must pay it to the litoshi.
pub async fn new_order<B, C, R>(
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let request = body.into_inner();
    let customer_id = request.customer_id.trim();
    if customer_id.is_empty() {
        return Err(ServerError::InvalidRequestBody("customer_id cannot be empty".into()));
    }
    debug!("💻️ New order request for product {} from {customer_id}", request.product_id);
    let invoice = api.initiate_order(customer_id, request.product_id).await?;
    Ok(HttpResponse::Ok().json(invoice))
}

route!(order_by_id => Get "/order/{id}" impl LedgerDatabase, ChainDataSource, RateSource);
pub async fn order_by_id<B, C, R>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let order_id = OrderId(path.into_inner());
    trace!("💻️ Fetching order {order_id}");
    let order = api.fetch_order(order_id).await?.ok_or_else(|| ServerError::NoRecordFound(order_id.to_string()))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(check_payment => Post "/order/{id}/check" impl LedgerDatabase, ChainDataSource, RateSource);
/// "Check now". Polls the chain for the order's address and reports the order's status. An unreachable chain source
/// is not an error here; the order is simply not paid yet.
pub async fn check_payment<B, C, R>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let order_id = OrderId(path.into_inner());
    debug!("💻️ Payment check requested for order {order_id}");
    let status = api.check_payment(order_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

route!(submit_txid => Post "/order/{id}/txid" impl LedgerDatabase, ChainDataSource, RateSource);
pub async fn submit_txid<B, C, R>(
    path: web::Path<i64>,
    body: web::Json<TxidSubmission>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let order_id = OrderId(path.into_inner());
    let submission = body.into_inner();
    debug!("💻️ Transaction {} submitted for order {order_id}", submission.txid);
    let result = api.submit_txid(order_id, &submission.txid).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(pay_from_balance => Post "/order/{id}/pay" impl LedgerDatabase, ChainDataSource, RateSource);
pub async fn pay_from_balance<B, C, R>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let order_id = OrderId(path.into_inner());
    debug!("💻️ Request to pay order {order_id} from balance");
    let result = api.pay_from_balance(order_id).await?;
    Ok(HttpResponse::Ok().json(PayFromBalanceResponse::from(result)))
}

route!(cancel_order => Post "/order/{id}/cancel" impl LedgerDatabase, ChainDataSource, RateSource);
pub async fn cancel_order<B, C, R>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let order_id = OrderId(path.into_inner());
    info!("💻️ Request to cancel order {order_id}");
    let order = api.cancel_order(order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Customers  ----------------------------------------------------
route!(balance => Get "/balance/{customer_id}" impl LedgerDatabase, ChainDataSource, RateSource);
pub async fn balance<B, C, R>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let customer_id = path.into_inner();
    trace!("💻️ Fetching balance for {customer_id}");
    let balance = api.get_balance(&customer_id).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::new(customer_id, balance)))
}

route!(deposit_address => Get "/address/{customer_id}" impl LedgerDatabase, ChainDataSource, RateSource);
pub async fn deposit_address<B, C, R>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, C, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let customer_id = path.into_inner();
    let address = api.deposit_address(&customer_id).await?;
    Ok(HttpResponse::Ok().json(DepositAddressResponse { customer_id, address }))
}

//----------------------------------------------   Rates  ----------------------------------------------------
route!(exchange_rate => Get "/rate" impl LedgerDatabase, ChainDataSource, RateSource);
pub async fn exchange_rate<B, C, R>(api: web::Data<OrderFlowApi<B, C, R>>) -> Result<HttpResponse, ServerError>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    let rate = api.current_rate().await?;
    Ok(HttpResponse::Ok().json(rate))
}
