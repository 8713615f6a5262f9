use std::{collections::HashSet, fmt::Debug};

use log::*;
use lpg_common::Litoshi;

use crate::{
    address::{AddressAllocator, AllocationMode},
    api::{
        errors::OrderFlowError,
        order_objects::{OrderInvoice, PaymentStatus, TxidVerification},
        reconciler::{ReconcileSummary, Reconciler},
    },
    chain::{ChainDataSource, ChainObserver},
    config::EngineConfig,
    db_types::{NewOrder, Order, OrderId, OrderStatusType, PaymentFromBalance},
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    rates::{ExchangeRate, RateProvider, RateSource},
    traits::LedgerDatabase,
    uniquifier::AmountUniquifier,
};

/// `OrderFlowApi` is the primary API for the storefront: creating orders, answering "have I paid yet?", and
/// spending customer balances.
#[derive(Clone)]
pub struct OrderFlowApi<B, C, R> {
    db: B,
    allocator: AddressAllocator<B>,
    rates: RateProvider<B, R>,
    uniquifier: AmountUniquifier,
    reconciler: Reconciler<B, C>,
    producers: EventProducers,
}

impl<B, C, R> Debug for OrderFlowApi<B, C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi({:?})", self.allocator.mode())
    }
}

impl<B, C, R> OrderFlowApi<B, C, R>
where B: Clone
{
    pub fn new(
        db: B,
        mode: AllocationMode,
        observer: ChainObserver<C>,
        rate_source: R,
        config: &EngineConfig,
        producers: EventProducers,
    ) -> Self {
        let reconciler = Reconciler::new(db.clone(), observer, &mode, config, producers.clone());
        let allocator = AddressAllocator::new(db.clone(), mode);
        let rates = RateProvider::new(db.clone(), rate_source, &config.fiat_currency)
            .with_max_age(config.rate_max_age)
            .with_timeout(config.request_timeout)
            .with_default_rate(config.default_rate);
        Self { db, allocator, rates, uniquifier: config.uniquifier, reconciler, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn reconciler(&self) -> &Reconciler<B, C> {
        &self.reconciler
    }

    /// Logs the chance that two orders open at the same time on the shared address draw the same offset.
    pub fn log_collision_bound(&self, open_orders: u64) {
        if !self.allocator.is_shared() {
            return;
        }
        let p = self.uniquifier.collision_probability(open_orders);
        info!(
            "🧾️ Amount offsets are drawn from {}..={} litoshi ({} values). With {open_orders} orders open at once, \
             the chance of a repeated offset before redraws is {:.2}%",
            self.uniquifier.min_offset().value(),
            self.uniquifier.max_offset().value(),
            self.uniquifier.range_size(),
            p * 100.0
        );
    }
}

impl<B, C, R> OrderFlowApi<B, C, R>
where
    B: LedgerDatabase,
    C: ChainDataSource,
    R: RateSource,
{
    /// Quotes a product in LTC and opens a pending order for it.
    ///
    /// The fiat price is converted at the current rate (rounded down). On a shared address, a random offset is added
    /// so that the amount identifies the order; offsets already asked for by pending orders on the address are
    /// avoided.
    pub async fn initiate_order(&self, customer_id: &str, product_id: i64) -> Result<OrderInvoice, OrderFlowError> {
        let product = self
            .db
            .fetch_product(product_id)
            .await?
            .filter(|p| p.active)
            .ok_or(OrderFlowError::ProductNotFound(product_id))?;
        let rate = self.rates.current_rate().await?;
        let base = rate.convert_to_litoshi(product.price)?;
        if !base.is_positive() {
            return Err(OrderFlowError::InvalidPrice(product_id));
        }
        let address = self.allocator.allocate(customer_id).await?;
        let amount = if self.allocator.is_shared() {
            let taken = self
                .db
                .fetch_pending_orders_for_address(&address)
                .await?
                .into_iter()
                .map(|o| o.required_amount)
                .collect::<HashSet<Litoshi>>();
            self.uniquifier.uniquify_avoiding(base, &taken)
        } else {
            base
        };
        let order = self.db.insert_order(NewOrder::new(customer_id, product_id, amount, &address)).await?;
        info!(
            "🧾️ Order {} created for {customer_id}: {} ({} at {rate}) to {address}",
            order.id, order.required_amount, product.price
        );
        Ok(OrderInvoice {
            order_id: order.id,
            customer_id: order.customer_id,
            product_id,
            target_address: order.target_address,
            required_amount: order.required_amount,
            price: product.price,
            rate,
            created_at: order.created_at,
        })
    }

    /// "Check now". Reconciles the order's address and reports its status.
    pub async fn check_payment(&self, order_id: OrderId) -> Result<PaymentStatus, OrderFlowError> {
        self.reconciler.check_order(order_id).await
    }

    /// The customer tells us which transaction paid for their order.
    pub async fn submit_txid(&self, order_id: OrderId, txid: &str) -> Result<TxidVerification, OrderFlowError> {
        let result = self.reconciler.verify_transaction(order_id, txid).await?;
        debug!("🧾️ Transaction {txid} submitted for order {order_id}: {result:?}");
        Ok(result)
    }

    pub async fn reconcile(&self) -> Result<ReconcileSummary, OrderFlowError> {
        self.reconciler.reconcile_once().await
    }

    pub async fn get_balance(&self, customer_id: &str) -> Result<Litoshi, OrderFlowError> {
        let balance = self.db.fetch_balance(customer_id).await?;
        Ok(balance.amount)
    }

    /// The customer's receiving address. In per-customer mode the first call assigns one.
    pub async fn deposit_address(&self, customer_id: &str) -> Result<String, OrderFlowError> {
        let address = self.allocator.allocate(customer_id).await?;
        Ok(address)
    }

    /// Pays a pending order out of the customer's balance.
    pub async fn pay_from_balance(&self, order_id: OrderId) -> Result<PaymentFromBalance, OrderFlowError> {
        let result = self.db.pay_order_from_balance(order_id).await?;
        match &result {
            PaymentFromBalance::Paid { order, .. } => {
                self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
            },
            PaymentFromBalance::InsufficientFunds => debug!("🧾️ Insufficient balance to pay order {order_id}"),
            PaymentFromBalance::OrderNotPending(order) => {
                debug!("🧾️ Order {order_id} cannot be paid from balance. It is {}", order.status)
            },
        }
        Ok(result)
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.cancel_or_expire_order(order_id, OrderStatusType::Cancelled).await?;
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone())).await;
        Ok(order)
    }

    /// Expires every pending order older than `limit`.
    pub async fn expire_old_orders(&self, limit: chrono::Duration) -> Result<Vec<Order>, OrderFlowError> {
        let expired = self.db.expire_old_orders(limit).await?;
        if !expired.is_empty() {
            info!("🧾️ {} unpaid orders have expired", expired.len());
        }
        for order in &expired {
            self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone())).await;
        }
        Ok(expired)
    }

    pub async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError> {
        let order = self.db.fetch_order(order_id).await?;
        Ok(order)
    }

    pub async fn current_rate(&self) -> Result<ExchangeRate, OrderFlowError> {
        let rate = self.rates.current_rate().await?;
        Ok(rate)
    }
}
