use chrono::Duration;
use log::*;
use ltc_payment_engine::db_types::Order;
use tokio::task::JoinHandle;

use crate::server::GatewayApi;

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(api: GatewayApi, unpaid_expiry: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        info!("🕰️ Unpaid order expiry worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running unpaid order expiry job");
            match api.expire_old_orders(unpaid_expiry).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No orders expired"),
                Ok(expired) => {
                    info!("🕰️ {} orders expired", expired.len());
                    debug!("🕰️ Expired unpaid orders: {}", order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running unpaid order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] cust_id: {} amount: {}", o.id, o.customer_id, o.required_amount))
        .collect::<Vec<String>>()
        .join(", ")
}
