//! # LTC payment gateway server
//! This crate hosts the storefront-facing server for the Litecoin payment gateway. It is responsible for:
//! * Quoting orders in LTC and handing out payment addresses.
//! * Answering "have I paid yet?" and accepting transaction ids from customers.
//! * Running the reconciliation and order expiry workers in the background.
//! * Forwarding payment events to a notification webhook.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /order`: Create an order and receive its invoice.
//! * `GET /order/{id}`: Fetch an order.
//! * `POST /order/{id}/check`: Check the chain for a payment now.
//! * `POST /order/{id}/txid`: Submit the transaction that paid for the order.
//! * `POST /order/{id}/pay`: Pay for the order from the customer's balance.
//! * `POST /order/{id}/cancel`: Cancel a pending order.
//! * `GET /balance/{customer_id}`: The customer's balance.
//! * `GET /address/{customer_id}`: The customer's deposit address.
//! * `GET /rate`: The exchange rate orders are currently quoted at.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod notifier;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
