use actix_web::http::StatusCode;
use lpg_common::Litoshi;
use ltc_payment_engine::{db_types::OrderStatusType, order_objects::OrderInvoice};
use serde_json::json;

use super::helpers::{hundred_dollar_feed, TestGateway};
use crate::data_objects::{BalanceResponse, DepositAddressResponse, PayFromBalanceResponse};

const TXID: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0";

#[actix_web::test]
async fn empty_balance() {
    let gateway = TestGateway::per_customer(hundred_dollar_feed()).await;
    let (status, body) = gateway.get("/balance/nobody").await;
    assert_eq!(status, StatusCode::OK);
    let balance: BalanceResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(balance, BalanceResponse::new("nobody".into(), Litoshi::from(0)));
    gateway.tear_down().await;
}

#[actix_web::test]
async fn deposit_addresses_are_stable() {
    let gateway = TestGateway::per_customer(hundred_dollar_feed()).await;
    let (status, body) = gateway.get("/address/carol").await;
    assert_eq!(status, StatusCode::OK);
    let first: DepositAddressResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(first.address, "ltc1qtest000000");
    let (_, body) = gateway.get("/address/carol").await;
    let second: DepositAddressResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(first, second);
    gateway.tear_down().await;
}

#[actix_web::test]
async fn derivation_failures_are_temporary_outages() {
    let gateway = TestGateway::per_customer(hundred_dollar_feed()).await;
    gateway.deriver.set_failing(true);
    let (status, body) = gateway.post("/order", &json!({ "customer_id": "carol", "product_id": gateway.product_id })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("derivation"), "{body}");
    let (status, _) = gateway.get("/address/carol").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    gateway.tear_down().await;
}

#[actix_web::test]
async fn paying_from_balance() {
    let gateway = TestGateway::per_customer(hundred_dollar_feed()).await;
    let (_, body) = gateway.post("/order", &json!({ "customer_id": "carol", "product_id": gateway.product_id })).await;
    let invoice: OrderInvoice = serde_json::from_str(&body).unwrap();
    // No offset in per-customer mode
    assert_eq!(invoice.required_amount, Litoshi::from(25_000_000));
    let path = format!("/order/{}/pay", invoice.order_id.value());

    let (status, body) = gateway.post_empty(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<PayFromBalanceResponse>(&body).unwrap(), PayFromBalanceResponse::InsufficientFunds);

    // A deposit larger than the order: the reconciler pays the order and keeps the change
    gateway.chain.add_payment(TXID, &invoice.target_address, Litoshi::from(40_000_000), 2);
    gateway.api.reconcile().await.unwrap();
    let (_, body) = gateway.get("/balance/carol").await;
    let balance: BalanceResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(balance.balance, Litoshi::from(15_000_000));
    assert_eq!(balance.balance_ltc, "0.15000000");

    let (status, body) = gateway.post_empty(&path).await;
    assert_eq!(status, StatusCode::OK);
    let result = serde_json::from_str::<PayFromBalanceResponse>(&body).unwrap();
    assert_eq!(result, PayFromBalanceResponse::OrderNotPending { status: OrderStatusType::Paid });
    gateway.tear_down().await;
}
