use actix_web::http::StatusCode;
use lpg_common::Litoshi;
use ltc_payment_engine::{
    db_types::{Order, OrderStatusType},
    order_objects::{OrderInvoice, PaymentStatus, TxidVerification},
    rates::RateError,
};
use serde_json::json;

use super::{
    helpers::{hundred_dollar_feed, TestGateway, MERCHANT_ADDRESS},
    mocks::MockRateFeed,
};

const TXID: &str = "5e3a4b1f0e9d8c7b6a5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b";

async fn place_order(gateway: &TestGateway, customer_id: &str) -> OrderInvoice {
    let body = json!({ "customer_id": customer_id, "product_id": gateway.product_id });
    let (status, body) = gateway.post("/order", &body).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    serde_json::from_str(&body).expect("Response was not an invoice")
}

#[actix_web::test]
async fn new_order_returns_an_invoice() {
    let gateway = TestGateway::shared(hundred_dollar_feed()).await;
    let invoice = place_order(&gateway, "alice").await;
    assert_eq!(invoice.customer_id, "alice");
    assert_eq!(invoice.target_address, MERCHANT_ADDRESS);
    // $25 at $100 per LTC, plus the 37 litoshi offset
    assert_eq!(invoice.required_amount, Litoshi::from(25_000_037));
    assert_eq!(invoice.rate.rate.value(), 10_000);

    let (status, body) = gateway.get(&format!("/order/{}", invoice.order_id.value())).await;
    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.required_amount, invoice.required_amount);
    gateway.tear_down().await;
}

#[actix_web::test]
async fn bad_order_requests() {
    let gateway = TestGateway::shared(hundred_dollar_feed()).await;
    let (status, body) = gateway.post("/order", &json!({ "customer_id": "alice", "product_id": 999 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Product 999"), "{body}");

    let (status, _) = gateway.post("/order", &json!({ "customer_id": "  ", "product_id": gateway.product_id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = gateway.post("/order", &json!({ "customer": "alice" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = gateway.get("/order/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    gateway.tear_down().await;
}

#[actix_web::test]
async fn orders_cannot_be_quoted_without_a_rate() {
    let mut feed = MockRateFeed::new();
    feed.expect_fetch_rate().returning(|currency| Err(RateError::RateUnavailable(currency.to_string())));
    let gateway = TestGateway::shared(feed).await;
    let (status, body) = gateway.post("/order", &json!({ "customer_id": "alice", "product_id": gateway.product_id })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("error"), "{body}");
    let (status, _) = gateway.get("/rate").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    gateway.tear_down().await;
}

#[actix_web::test]
async fn the_current_rate() {
    let gateway = TestGateway::shared(hundred_dollar_feed()).await;
    let (status, body) = gateway.get("/rate").await;
    assert_eq!(status, StatusCode::OK);
    let rate: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(rate["rate"], 10_000);
    assert_eq!(rate["base_currency"], "usd");
    gateway.tear_down().await;
}

#[actix_web::test]
async fn check_now_settles_a_paid_order() {
    let gateway = TestGateway::shared(hundred_dollar_feed()).await;
    let invoice = place_order(&gateway, "alice").await;
    let path = format!("/order/{}/check", invoice.order_id.value());

    let (status, body) = gateway.post_empty(&path).await;
    assert_eq!(status, StatusCode::OK);
    let payment: PaymentStatus = serde_json::from_str(&body).unwrap();
    assert_eq!(payment.status, OrderStatusType::Pending);

    gateway.chain.add_payment(TXID, MERCHANT_ADDRESS, invoice.required_amount, 1);
    let (status, body) = gateway.post_empty(&path).await;
    assert_eq!(status, StatusCode::OK);
    let payment: PaymentStatus = serde_json::from_str(&body).unwrap();
    assert_eq!(payment.status, OrderStatusType::Paid);
    assert_eq!(payment.txid.as_deref(), Some(TXID));
    gateway.tear_down().await;
}

#[actix_web::test]
async fn check_now_survives_a_chain_outage() {
    let gateway = TestGateway::shared(hundred_dollar_feed()).await;
    let invoice = place_order(&gateway, "alice").await;
    gateway.chain.set_offline(true);
    let (status, body) = gateway.post_empty(&format!("/order/{}/check", invoice.order_id.value())).await;
    assert_eq!(status, StatusCode::OK);
    let payment: PaymentStatus = serde_json::from_str(&body).unwrap();
    assert_eq!(payment.status, OrderStatusType::Pending);
    gateway.tear_down().await;
}

#[actix_web::test]
async fn submitted_txids() {
    let gateway = TestGateway::shared(hundred_dollar_feed()).await;
    let invoice = place_order(&gateway, "alice").await;
    let path = format!("/order/{}/txid", invoice.order_id.value());

    let (status, _) = gateway.post(&path, &json!({ "txid": "not-a-txid" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = gateway.post(&path, &json!({ "txid": TXID })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<TxidVerification>(&body).unwrap(), TxidVerification::NotFound);

    gateway.chain.add_payment(TXID, MERCHANT_ADDRESS, invoice.required_amount, 3);
    let (status, body) = gateway.post(&path, &json!({ "txid": TXID.to_uppercase() })).await;
    assert_eq!(status, StatusCode::OK);
    let result = serde_json::from_str::<TxidVerification>(&body).unwrap();
    assert!(matches!(result, TxidVerification::Credited { status } if status.is_paid()), "{body}");

    let (_, body) = gateway.post(&path, &json!({ "txid": TXID })).await;
    let result = serde_json::from_str::<TxidVerification>(&body).unwrap();
    assert!(matches!(result, TxidVerification::AlreadyCredited { .. }), "{body}");
    gateway.tear_down().await;
}

#[actix_web::test]
async fn cancelling_orders() {
    let gateway = TestGateway::shared(hundred_dollar_feed()).await;
    let invoice = place_order(&gateway, "alice").await;
    let path = format!("/order/{}/cancel", invoice.order_id.value());
    let (status, body) = gateway.post_empty(&path).await;
    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_str(&body).unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);

    let (status, body) = gateway.post_empty(&path).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("Cancelled"), "{body}");

    let (status, _) = gateway.post_empty("/order/999/cancel").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    gateway.tear_down().await;
}
