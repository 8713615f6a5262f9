use std::time::Duration;

use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::server::GatewayApi;

/// Starts the reconciliation worker, which polls the chain every `interval` and credits what it finds. Do not await
/// the returned JoinHandle, as it will run indefinitely.
///
/// A failed pass is logged and the next one starts on schedule. Passes never overlap: if one runs long, the missed
/// ticks are skipped.
pub fn start_reconciliation_worker(api: GatewayApi, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("🕰️ Reconciliation worker started. Polling every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running reconciliation pass");
            match api.reconcile().await {
                Ok(summary) if summary.credits > 0 || summary.failures > 0 => {
                    info!(
                        "🕰️ Reconciliation pass: {} addresses polled, {} new credits, {} orders paid, {} failures",
                        summary.addresses_polled,
                        summary.credits,
                        summary.orders_paid.len(),
                        summary.failures
                    );
                },
                Ok(summary) => debug!("🕰️ Reconciliation pass found nothing new. {summary:?}"),
                Err(e) => error!("🕰️ Reconciliation pass failed. Retrying in {}s. {e}", interval.as_secs()),
            }
        }
    })
}
