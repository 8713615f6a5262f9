//! Payment event notifications
//!
//! Every payment event is logged. If a webhook URL is configured, `OrderPaid` and `PaymentCredited` events are also
//! POSTed to it as JSON, tagged with an `event` field. Delivery is best-effort: failures are logged and never retried,
//! so the receiver should treat the gateway's `GET /order/{id}` as the source of truth.
use std::{future::Future, pin::Pin, time::Duration};

use log::*;
use ltc_payment_engine::events::{EventHooks, EventType};
use reqwest::Client;

use crate::errors::ServerError;

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not create the webhook client. {e}")))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub async fn notify(&self, event: EventType) {
        let Some(url) = &self.url else {
            return;
        };
        let result = self.client.post(url).json(&event).send().await.and_then(|r| r.error_for_status());
        match result {
            Ok(res) => debug!("📬️ Notification delivered to {url}: {}", res.status()),
            Err(e) => warn!("📬️ Could not deliver the notification to {url}. {e}"),
        }
    }

    /// The hooks that log every event and forward payments to the webhook.
    pub fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let notifier = self.clone();
        hooks.on_order_paid(move |ev| {
            info!(
                "📬️ Order {} for {} is paid ({}). Transaction: {}",
                ev.order.id,
                ev.order.customer_id,
                ev.amount,
                ev.txid.as_deref().unwrap_or("from balance")
            );
            let notifier = notifier.clone();
            Box::pin(async move { notifier.notify(EventType::OrderPaid(ev)).await }) as HookFuture
        });
        let notifier = self.clone();
        hooks.on_payment_credited(move |ev| {
            info!("📬️ {} credited to {} from {} on {}", ev.amount, ev.customer_id, ev.txid, ev.address);
            let notifier = notifier.clone();
            Box::pin(async move { notifier.notify(EventType::PaymentCredited(ev)).await }) as HookFuture
        });
        hooks.on_order_annulled(move |ev| {
            info!("📬️ Order {} for {} is {}", ev.order.id, ev.order.customer_id, ev.status);
            Box::pin(async {}) as HookFuture
        });
        hooks
    }
}
