//! The reconciliation driver: observe, match, credit.
//!
//! A pass is safe to run at any time and any number of times, concurrently with itself. It holds no state between
//! passes. Everything it decides is re-derived from storage and the chain, and the ledger's uniqueness constraint
//! makes re-crediting impossible.
use std::{fmt::Debug, ops::AddAssign};

use chrono::Utc;
use futures_util::future::join_all;
use log::*;
use lpg_common::Litoshi;
use serde::{Deserialize, Serialize};

use crate::{
    address::AllocationMode,
    api::{
        errors::OrderFlowError,
        order_objects::{PaymentStatus, TxidVerification},
    },
    chain::{ChainDataSource, ChainObserver, PaymentSighting, TransactionObservation},
    config::EngineConfig,
    db_types::{AddressAssignment, CreditResult, NewCredit, Order, OrderId, PaymentFromBalance},
    events::{EventProducers, OrderPaidEvent, PaymentCreditedEvent},
    matcher::{clamp_tolerance, credited_keys, match_by_address, match_by_amount},
    traits::LedgerDatabase,
};

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub addresses_polled: usize,
    pub sightings: usize,
    /// Payments newly recorded in the ledger
    pub credits: usize,
    pub orders_paid: Vec<OrderId>,
    /// Credits that failed with a storage error. They are retried on the next pass.
    pub failures: usize,
}

impl AddAssign for ReconcileSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.addresses_polled += rhs.addresses_polled;
        self.sightings += rhs.sightings;
        self.credits += rhs.credits;
        self.orders_paid.extend(rhs.orders_paid);
        self.failures += rhs.failures;
    }
}

#[derive(Clone)]
pub struct Reconciler<B, C> {
    db: B,
    observer: ChainObserver<C>,
    shared_address: Option<String>,
    tolerance: Litoshi,
    activity_window: chrono::Duration,
    producers: EventProducers,
}

impl<B, C> Debug for Reconciler<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.shared_address {
            Some(address) => write!(f, "Reconciler(shared: {address})"),
            None => write!(f, "Reconciler(per-customer)"),
        }
    }
}

impl<B, C> Reconciler<B, C> {
    pub fn new(
        db: B,
        observer: ChainObserver<C>,
        mode: &AllocationMode,
        config: &EngineConfig,
        producers: EventProducers,
    ) -> Self {
        let shared_address = match mode {
            AllocationMode::Shared(address) => Some(address.clone()),
            AllocationMode::PerCustomer(_) => None,
        };
        Self {
            db,
            observer,
            shared_address,
            tolerance: clamp_tolerance(config.match_tolerance),
            activity_window: config.activity_window,
            producers,
        }
    }

    pub fn observer(&self) -> &ChainObserver<C> {
        &self.observer
    }

    pub fn is_shared(&self) -> bool {
        self.shared_address.is_some()
    }
}

impl<B, C> Reconciler<B, C>
where
    B: LedgerDatabase,
    C: ChainDataSource,
{
    /// One full pass over everything that can currently be paid.
    ///
    /// * Shared address: every address with a pending order is observed once (normally just the merchant address),
    ///   and the confirmed sightings are matched to pending orders by amount. Nothing is polled while no order is
    ///   pending.
    /// * Per-customer addresses: every address that was active within the activity window, or whose owner has a
    ///   pending order, is observed concurrently. New deposits are credited to balances, and pending orders are then
    ///   paid from the balances, oldest first.
    pub async fn reconcile_once(&self) -> Result<ReconcileSummary, OrderFlowError> {
        let summary = match self.shared_address {
            Some(_) => self.reconcile_shared().await?,
            None => self.reconcile_per_customer().await?,
        };
        if summary.credits > 0 || !summary.orders_paid.is_empty() || summary.failures > 0 {
            info!(
                "🔄️ Reconciliation pass complete. {} addresses polled, {} new credits, {} orders paid, {} failures",
                summary.addresses_polled,
                summary.credits,
                summary.orders_paid.len(),
                summary.failures
            );
        } else {
            debug!("🔄️ Reconciliation pass complete. {} addresses polled, nothing new", summary.addresses_polled);
        }
        Ok(summary)
    }

    /// Reconciles one order's address (or customer, for per-customer addresses) and returns the order's status
    /// afterwards.
    ///
    /// A chain source that is down or slow is not an error here: the order's status is simply unchanged.
    pub async fn check_order(&self, order_id: OrderId) -> Result<PaymentStatus, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if !order.is_pending() {
            return Ok(PaymentStatus::from(&order));
        }
        match self.shared_address {
            Some(_) => {
                self.reconcile_address(&order.target_address).await?;
            },
            None => match self.db.fetch_assignment(&order.customer_id).await? {
                Some(assignment) => {
                    let sightings = self.observer.observe(&assignment.address).await;
                    self.reconcile_customer(&assignment, &sightings).await?;
                },
                None => warn!("🔄️ Order {order_id} is pending but {} has no address assignment", order.customer_id),
            },
        }
        let order = self.fetch_order(order_id).await?;
        debug!("🔄️ Order {order_id} checked. Status: {}", order.status);
        Ok(PaymentStatus::from(&order))
    }

    /// Checks a transaction id supplied by the customer directly against the chain, and credits it if it pays the
    /// order.
    pub async fn verify_transaction(&self, order_id: OrderId, txid: &str) -> Result<TxidVerification, OrderFlowError> {
        let txid = txid.trim().to_lowercase();
        if !is_valid_txid(&txid) {
            return Err(OrderFlowError::InvalidTxid(txid));
        }
        let order = self.fetch_order(order_id).await?;
        if !order.is_pending() {
            let status = PaymentStatus::from(&order);
            return Ok(match order.txid.as_deref() {
                Some(t) if t == txid => TxidVerification::AlreadyCredited { status },
                _ => TxidVerification::OrderNotPending { status },
            });
        }
        let sighting = match self.observer.observe_transaction(&txid, &order.target_address).await {
            TransactionObservation::Unavailable => return Ok(TxidVerification::Unavailable),
            TransactionObservation::NotFound => return Ok(TxidVerification::NotFound),
            TransactionObservation::NoPayment => return Ok(TxidVerification::NoPayment),
            TransactionObservation::Unconfirmed(s) => {
                let required = self.observer.min_confirmations();
                return Ok(TxidVerification::Unconfirmed { confirmations: s.confirmations, required });
            },
            TransactionObservation::Confirmed(s) => s,
        };
        match self.shared_address {
            Some(_) => self.verify_shared_payment(order, sighting).await,
            None => self.verify_deposit(order, sighting).await,
        }
    }

    /// An exact amount is credited to the order outright. An amount that is only within tolerance goes through the
    /// matcher with the address's other pending orders, and is credited only if it lands on this order. A payment that
    /// exactly pays another order is never credited here.
    async fn verify_shared_payment(
        &self,
        order: Order,
        sighting: PaymentSighting,
    ) -> Result<TxidVerification, OrderFlowError> {
        let max_diff = self.tolerance.value().unsigned_abs();
        let diff = order.required_amount.abs_diff(sighting.value);
        let matched = diff == 0 || (diff <= max_diff && self.tolerance_match_is(&order, &sighting).await?);
        if !matched {
            info!(
                "🔄️ {} pays {} into {}, but order {} asks for {}",
                sighting.txid, sighting.value, sighting.address, order.id, order.required_amount
            );
            return Ok(TxidVerification::AmountMismatch { expected: order.required_amount, received: sighting.value });
        }
        let credit =
            NewCredit::for_order(order.id, &sighting.address, &sighting.txid, sighting.value, sighting.confirmations);
        let mut summary = ReconcileSummary::default();
        let result = self.apply_credit(credit, &mut summary).await?;
        let order = self.fetch_order(order.id).await?;
        let status = PaymentStatus::from(&order);
        Ok(match result {
            CreditResult::OrderPaid { .. } => TxidVerification::Credited { status },
            CreditResult::AlreadyCredited => TxidVerification::AlreadyCredited { status },
            _ => TxidVerification::OrderNotPending { status },
        })
    }

    async fn verify_deposit(&self, order: Order, sighting: PaymentSighting) -> Result<TxidVerification, OrderFlowError> {
        let assignment = self.db.fetch_assignment_by_address(&sighting.address).await?;
        let Some(assignment) = assignment else {
            warn!("🔄️ {} has no owner. Order {} was created for an unassigned address.", sighting.address, order.id);
            return Ok(TxidVerification::NoPayment);
        };
        let summary = self.reconcile_customer(&assignment, std::slice::from_ref(&sighting)).await?;
        if summary.failures > 0 {
            return Err(OrderFlowError::DatabaseError(format!(
                "Deposit {} to {} could not be credited. It will be retried on the next pass.",
                sighting.txid, assignment.customer_id
            )));
        }
        let order = self.fetch_order(order.id).await?;
        let status = PaymentStatus::from(&order);
        Ok(if summary.credits > 0 {
            TxidVerification::Credited { status }
        } else {
            TxidVerification::AlreadyCredited { status }
        })
    }

    /// Whether the matcher, given every order pending on the sighting's address, pairs the sighting with `order`.
    async fn tolerance_match_is(&self, order: &Order, sighting: &PaymentSighting) -> Result<bool, OrderFlowError> {
        let pending = self.db.fetch_pending_orders_for_address(&sighting.address).await?;
        let credited = credited_keys(&self.db.credited_transactions_for_address(&sighting.address).await?);
        let matches = match_by_amount(&pending, std::slice::from_ref(sighting), &credited, self.tolerance);
        Ok(matches.iter().any(|m| m.order.id == order.id))
    }

    async fn reconcile_shared(&self) -> Result<ReconcileSummary, OrderFlowError> {
        let addresses = self.db.fetch_pending_order_addresses().await?;
        if addresses.is_empty() {
            trace!("🔄️ No pending orders. Skipping the chain poll.");
        }
        let mut summary = ReconcileSummary::default();
        for address in addresses {
            summary += self.reconcile_address(&address).await?;
        }
        Ok(summary)
    }

    /// Matches the confirmed payments into `address` against the orders waiting on it.
    async fn reconcile_address(&self, address: &str) -> Result<ReconcileSummary, OrderFlowError> {
        let mut summary = ReconcileSummary::default();
        let pending = self.db.fetch_pending_orders_for_address(address).await?;
        if pending.is_empty() {
            return Ok(summary);
        }
        let sightings = self.observer.observe(address).await;
        summary.addresses_polled = 1;
        summary.sightings = sightings.len();
        if sightings.is_empty() {
            return Ok(summary);
        }
        let credited = credited_keys(&self.db.credited_transactions_for_address(address).await?);
        let matches = match_by_amount(&pending, &sightings, &credited, self.tolerance);
        trace!("🔄️ {address}: {} pending orders, {} sightings, {} matches", pending.len(), sightings.len(), matches.len());
        for m in matches {
            let s = m.sighting;
            let credit = NewCredit::for_order(m.order.id, &s.address, &s.txid, s.value, s.confirmations);
            // One failed credit must not stop the others
            if let Err(e) = self.apply_credit(credit, &mut summary).await {
                error!("🔄️ Could not credit {} to order {}. Will retry on the next pass. {e}", s.txid, m.order.id);
                summary.failures += 1;
            }
        }
        Ok(summary)
    }

    async fn reconcile_per_customer(&self) -> Result<ReconcileSummary, OrderFlowError> {
        let since = Utc::now() - self.activity_window;
        let assignments = self.db.fetch_active_assignments(since).await?;
        trace!("🔄️ Polling {} customer addresses", assignments.len());
        let observations =
            join_all(assignments.iter().map(|a| async move { (a, self.observer.observe(&a.address).await) })).await;
        let mut summary = ReconcileSummary::default();
        for (assignment, sightings) in observations {
            summary.addresses_polled += 1;
            summary.sightings += sightings.len();
            match self.reconcile_customer(assignment, &sightings).await {
                Ok(s) => summary += s,
                Err(e) => {
                    error!("🔄️ Could not reconcile {}. Will retry on the next pass. {e}", assignment.customer_id);
                    summary.failures += 1;
                },
            }
        }
        Ok(summary)
    }

    /// Credits new deposits on the customer's address to their balance, then pays whatever pending orders the balance
    /// covers.
    async fn reconcile_customer(
        &self,
        assignment: &AddressAssignment,
        sightings: &[PaymentSighting],
    ) -> Result<ReconcileSummary, OrderFlowError> {
        let mut summary = ReconcileSummary::default();
        if !sightings.is_empty() {
            let credited = credited_keys(&self.db.credited_transactions_for_address(&assignment.address).await?);
            let deposits = match_by_address(std::slice::from_ref(assignment), sightings, &credited);
            for d in deposits {
                let s = d.sighting;
                let credit = NewCredit::for_customer(&d.customer_id, &s.address, &s.txid, s.value, s.confirmations);
                if let Err(e) = self.apply_credit(credit, &mut summary).await {
                    error!("🔄️ Could not credit deposit {} to {}. {e}", s.txid, d.customer_id);
                    summary.failures += 1;
                }
            }
        }
        self.pay_orders_from_balance(&assignment.customer_id, &mut summary).await?;
        Ok(summary)
    }

    /// Pays the customer's pending orders from their balance, oldest first. An order the balance does not cover is
    /// skipped, and a cheaper, newer order may still be paid.
    async fn pay_orders_from_balance(
        &self,
        customer_id: &str,
        summary: &mut ReconcileSummary,
    ) -> Result<(), OrderFlowError> {
        let mut balance = self.db.fetch_balance(customer_id).await?.amount;
        if !balance.is_positive() {
            return Ok(());
        }
        for order in self.db.fetch_pending_orders_for_customer(customer_id).await? {
            if order.required_amount > balance {
                trace!("🔄️ Balance of {customer_id} ({balance}) does not cover order {}", order.id);
                continue;
            }
            match self.db.pay_order_from_balance(order.id).await? {
                PaymentFromBalance::Paid { order, balance: remaining } => {
                    balance = remaining.amount;
                    summary.orders_paid.push(order.id);
                    self.producers.publish_order_paid(OrderPaidEvent::new(order)).await;
                },
                PaymentFromBalance::InsufficientFunds => {
                    balance = self.db.fetch_balance(customer_id).await?.amount;
                },
                PaymentFromBalance::OrderNotPending(o) => {
                    trace!("🔄️ Order {} was settled concurrently ({})", o.id, o.status);
                },
            }
        }
        Ok(())
    }

    /// Hands a credit to the ledger and, once it has committed, publishes the events.
    async fn apply_credit(
        &self,
        credit: NewCredit,
        summary: &mut ReconcileSummary,
    ) -> Result<CreditResult, OrderFlowError> {
        let result = self.db.credit(credit).await?;
        match &result {
            CreditResult::OrderPaid { order, credit } => {
                summary.credits += 1;
                summary.orders_paid.push(order.id);
                self.producers.publish_payment_credited(PaymentCreditedEvent::for_order(credit)).await;
                self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
            },
            CreditResult::BalanceCredited { balance, credit } => {
                summary.credits += 1;
                self.producers.publish_payment_credited(PaymentCreditedEvent::for_deposit(credit, balance)).await;
            },
            CreditResult::AlreadyCredited => trace!("🔄️ Sighting was credited before. Nothing to do."),
            CreditResult::OrderNotPending(order) => {
                debug!("🔄️ Order {} is {}. The sighting stays eligible for other orders.", order.id, order.status)
            },
        }
        Ok(result)
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))
    }
}

/// Transaction ids are 32-byte hashes, hex encoded.
pub fn is_valid_txid(txid: &str) -> bool {
    txid.len() == 64 && txid.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn txid_validation() {
        let txid = "a".repeat(64);
        assert!(is_valid_txid(&txid));
        assert!(is_valid_txid("0f9e8d7c6b5a49382716051423324150fedcba9876543210aabbccddeeff0011"));
        assert!(!is_valid_txid(&"a".repeat(63)));
        assert!(!is_valid_txid(&"g".repeat(64)));
        assert!(!is_valid_txid(""));
    }

    #[test]
    fn summaries_add_up() {
        let mut a =
            ReconcileSummary { addresses_polled: 1, sightings: 2, credits: 1, orders_paid: vec![OrderId(1)], failures: 0 };
        a += ReconcileSummary { orders_paid: vec![OrderId(4)], addresses_polled: 2, failures: 1, ..Default::default() };
        assert_eq!(a.addresses_polled, 3);
        assert_eq!(a.orders_paid, vec![OrderId(1), OrderId(4)]);
        assert_eq!(a.failures, 1);
    }
}
