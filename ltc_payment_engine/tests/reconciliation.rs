use std::time::Duration;

use lpg_common::Litoshi;
use ltc_payment_engine::{
    address::AllocationMode,
    config::EngineConfig,
    db_types::OrderStatusType,
    order_objects::TxidVerification,
    uniquifier::AmountUniquifier,
    LedgerDatabase,
    OrderFlowError,
};

mod support;

use support::{txid, wait_for, TestSystem, SHARED_ADDRESS};

fn fixed_offset(offset: i64) -> EngineConfig {
    EngineConfig { uniquifier: AmountUniquifier::new(offset, offset).unwrap(), ..Default::default() }
}

#[tokio::test]
async fn payments_wait_for_confirmations() {
    let config = EngineConfig { min_confirmations: 2, ..Default::default() };
    let sys = TestSystem::shared(config).await;
    let invoice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, invoice.required_amount, 0);

    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.credits, 0);
    sys.chain.set_confirmations(&txid(1), 1);
    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.credits, 0);
    assert_eq!(sys.api.check_payment(invoice.order_id).await.unwrap().status, OrderStatusType::Pending);

    sys.chain.set_confirmations(&txid(1), 2);
    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.credits, 1);
    assert_eq!(summary.orders_paid, vec![invoice.order_id]);
    let status = sys.api.check_payment(invoice.order_id).await.unwrap();
    assert_eq!(status.status, OrderStatusType::Paid);
    assert_eq!(status.txid, Some(txid(1)));
    sys.tear_down().await;
}

#[tokio::test]
async fn the_oldest_order_wins_an_amount_tie() {
    let sys = TestSystem::shared(fixed_offset(37)).await;
    let first = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    let second = sys.api.initiate_order("bob", sys.product_id).await.unwrap();
    assert_eq!(first.required_amount, second.required_amount);

    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, first.required_amount, 1);
    sys.api.reconcile().await.unwrap();
    assert_eq!(sys.api.check_payment(first.order_id).await.unwrap().status, OrderStatusType::Paid);
    assert_eq!(sys.api.check_payment(second.order_id).await.unwrap().status, OrderStatusType::Pending);

    // A second payment of the same amount settles the remaining order
    sys.chain.add_payment(&txid(2), SHARED_ADDRESS, first.required_amount, 1);
    sys.api.reconcile().await.unwrap();
    let status = sys.api.check_payment(second.order_id).await.unwrap();
    assert_eq!(status.status, OrderStatusType::Paid);
    assert_eq!(status.txid, Some(txid(2)));
    sys.tear_down().await;
}

#[tokio::test]
async fn a_wrong_amount_settles_nothing() {
    let sys = TestSystem::shared(fixed_offset(37)).await;
    let invoice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    let short = invoice.required_amount - Litoshi::from(1);
    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, short, 6);
    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.sightings, 1);
    assert_eq!(summary.credits, 0);
    assert!(sys.db.credited_transactions_for_address(SHARED_ADDRESS).await.unwrap().is_empty());
    sys.tear_down().await;
}

#[tokio::test]
async fn a_one_litoshi_tolerance_can_be_configured() {
    let config = EngineConfig { match_tolerance: Litoshi::from(1), ..fixed_offset(37) };
    let sys = TestSystem::shared(config).await;
    let invoice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, invoice.required_amount - Litoshi::from(1), 6);
    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.orders_paid, vec![invoice.order_id]);
    sys.tear_down().await;
}

#[tokio::test]
async fn state_survives_a_restart() {
    let sys = TestSystem::shared(EngineConfig::default()).await;
    let paid = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    let pending = sys.api.initiate_order("bob", sys.product_id).await.unwrap();
    assert_ne!(paid.required_amount, pending.required_amount);
    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, paid.required_amount, 1);
    sys.api.reconcile().await.unwrap();

    let restarted = sys.restart(AllocationMode::Shared(SHARED_ADDRESS.to_string())).await;
    // The credited payment is not credited again
    let summary = restarted.reconcile().await.unwrap();
    assert_eq!(summary.credits, 0);
    assert_eq!(restarted.check_payment(paid.order_id).await.unwrap().status, OrderStatusType::Paid);
    // and the order that was pending before the restart can still be paid
    sys.chain.add_payment(&txid(2), SHARED_ADDRESS, pending.required_amount, 1);
    let summary = restarted.reconcile().await.unwrap();
    assert_eq!(summary.orders_paid, vec![pending.order_id]);
    assert_eq!(sys.db.credited_transactions_for_address(SHARED_ADDRESS).await.unwrap().len(), 2);
    sys.tear_down().await;
}

#[tokio::test]
async fn nothing_is_polled_without_pending_orders() {
    let sys = TestSystem::shared(EngineConfig::default()).await;
    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.addresses_polled, 0);
    assert_eq!(sys.chain.call_count(), 0);
    sys.tear_down().await;
}

#[tokio::test]
async fn an_unreachable_chain_is_not_an_error() {
    let sys = TestSystem::shared(EngineConfig::default()).await;
    let invoice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, invoice.required_amount, 3);
    sys.chain.set_offline(true);
    let status = sys.api.check_payment(invoice.order_id).await.unwrap();
    assert_eq!(status.status, OrderStatusType::Pending);
    assert_eq!(sys.api.reconcile().await.unwrap().credits, 0);

    sys.chain.set_offline(false);
    assert_eq!(sys.api.check_payment(invoice.order_id).await.unwrap().status, OrderStatusType::Paid);
    sys.tear_down().await;
}

#[tokio::test]
async fn a_slow_chain_times_out() {
    let sys = TestSystem::shared(EngineConfig::default()).await;
    let invoice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, invoice.required_amount, 3);
    sys.chain.set_delay(Duration::from_secs(5));
    let started = std::time::Instant::now();
    let status = sys.api.check_payment(invoice.order_id).await.unwrap();
    assert_eq!(status.status, OrderStatusType::Pending);
    assert!(started.elapsed() < Duration::from_secs(3));
    sys.tear_down().await;
}

#[tokio::test]
async fn deposits_pay_for_orders() {
    let sys = TestSystem::per_customer(EngineConfig::default()).await;
    let invoice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    // $25 at $100/LTC, and no offset on a customer's own address
    assert_eq!(invoice.required_amount, Litoshi::from(25_000_000));
    assert_eq!(invoice.target_address, "ltc1qtest000000");
    let bob = sys.api.deposit_address("bob").await.unwrap();
    assert_eq!(bob, "ltc1qtest000001");
    assert_eq!(sys.api.deposit_address("alice").await.unwrap(), invoice.target_address);

    sys.chain.add_payment(&txid(1), &invoice.target_address, Litoshi::from(30_000_000), 1);
    sys.chain.add_payment(&txid(2), &bob, Litoshi::from(1_000), 0);
    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.addresses_polled, 2);
    assert_eq!(summary.credits, 1);
    assert_eq!(summary.orders_paid, vec![invoice.order_id]);
    assert_eq!(sys.api.get_balance("alice").await.unwrap(), Litoshi::from(5_000_000));
    assert_eq!(sys.api.get_balance("bob").await.unwrap(), Litoshi::from(0));

    let events = sys.events.clone();
    wait_for(|| events.paid().len() == 1 && events.credited().len() == 1).await;
    let credited = sys.events.credited();
    assert_eq!(credited[0].customer_id, "alice");
    assert_eq!(credited[0].order_id, None);
    assert_eq!(credited[0].balance, Some(Litoshi::from(30_000_000)));
    let paid = sys.events.paid();
    assert_eq!(paid[0].order.id, invoice.order_id);
    assert_eq!(paid[0].txid, None);

    // Replaying the same chain data changes nothing
    let summary = sys.api.reconcile().await.unwrap();
    assert_eq!(summary.credits, 0);
    assert_eq!(sys.api.get_balance("alice").await.unwrap(), Litoshi::from(5_000_000));
    sys.tear_down().await;
}

#[tokio::test]
async fn balances_pay_new_orders_on_demand() {
    let sys = TestSystem::per_customer(EngineConfig::default()).await;
    let address = sys.api.deposit_address("carol").await.unwrap();
    sys.chain.add_payment(&txid(1), &address, Litoshi::from(60_000_000), 2);
    sys.api.reconcile().await.unwrap();
    assert_eq!(sys.api.get_balance("carol").await.unwrap(), Litoshi::from(60_000_000));

    let first = sys.api.initiate_order("carol", sys.product_id).await.unwrap();
    let second = sys.api.initiate_order("carol", sys.product_id).await.unwrap();
    let third = sys.api.initiate_order("carol", sys.product_id).await.unwrap();
    sys.api.reconcile().await.unwrap();
    // Oldest first, until the balance runs out
    assert_eq!(sys.api.check_payment(first.order_id).await.unwrap().status, OrderStatusType::Paid);
    assert_eq!(sys.api.check_payment(second.order_id).await.unwrap().status, OrderStatusType::Paid);
    assert_eq!(sys.api.check_payment(third.order_id).await.unwrap().status, OrderStatusType::Pending);
    assert_eq!(sys.api.get_balance("carol").await.unwrap(), Litoshi::from(10_000_000));
    sys.tear_down().await;
}

#[tokio::test]
async fn a_broken_deriver_only_fails_allocation() {
    let sys = TestSystem::per_customer(EngineConfig::default()).await;
    sys.deriver.set_failing(true);
    let err = sys.api.initiate_order("dave", sys.product_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::AddressAllocation(_)));
    assert!(sys.db.fetch_pending_orders_for_customer("dave").await.unwrap().is_empty());
    sys.deriver.set_failing(false);
    let invoice = sys.api.initiate_order("dave", sys.product_id).await.unwrap();
    // The failed attempt did not use up an index
    assert_eq!(invoice.target_address, "ltc1qtest000000");
    sys.tear_down().await;
}

#[tokio::test]
async fn customers_can_submit_their_txid() {
    let sys = TestSystem::shared(fixed_offset(37)).await;
    let invoice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    let other = sys.api.initiate_order("bob", sys.product_id).await.unwrap();

    let err = sys.api.submit_txid(invoice.order_id, "not a txid").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTxid(_)));
    assert_eq!(sys.api.submit_txid(invoice.order_id, &txid(1)).await.unwrap(), TxidVerification::NotFound);

    sys.chain.add_payment(&txid(1), SHARED_ADDRESS, invoice.required_amount, 0);
    let result = sys.api.submit_txid(invoice.order_id, &txid(1)).await.unwrap();
    assert_eq!(result, TxidVerification::Unconfirmed { confirmations: 0, required: 1 });

    sys.chain.add_payment(&txid(2), "ltc1qsomewhereelse", invoice.required_amount, 3);
    assert_eq!(sys.api.submit_txid(invoice.order_id, &txid(2)).await.unwrap(), TxidVerification::NoPayment);
    sys.chain.add_payment(&txid(3), SHARED_ADDRESS, Litoshi::from(1_000), 3);
    let result = sys.api.submit_txid(invoice.order_id, &txid(3)).await.unwrap();
    assert_eq!(
        result,
        TxidVerification::AmountMismatch { expected: invoice.required_amount, received: Litoshi::from(1_000) }
    );

    sys.chain.set_confirmations(&txid(1), 1);
    let result = sys.api.submit_txid(invoice.order_id, &txid(1)).await.unwrap();
    assert!(matches!(result, TxidVerification::Credited { ref status } if status.is_paid()));
    let result = sys.api.submit_txid(invoice.order_id, &txid(1)).await.unwrap();
    assert!(matches!(result, TxidVerification::AlreadyCredited { .. }));
    // The same transaction cannot pay a second order
    let result = sys.api.submit_txid(other.order_id, &txid(1)).await.unwrap();
    assert!(!matches!(result, TxidVerification::Credited { .. }));
    assert_eq!(sys.api.check_payment(other.order_id).await.unwrap().status, OrderStatusType::Pending);
    sys.tear_down().await;
}

#[tokio::test]
async fn cancelled_and_expired_orders_are_announced() {
    let sys = TestSystem::shared(EngineConfig::default()).await;
    let cancelled = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    let order = sys.api.cancel_order(cancelled.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert!(matches!(sys.api.cancel_order(cancelled.order_id).await, Err(OrderFlowError::IllegalTransition(_))));

    sys.api.initiate_order("bob", sys.product_id).await.unwrap();
    let expired = sys.api.expire_old_orders(chrono::Duration::zero()).await.unwrap();
    assert_eq!(expired.len(), 1);
    let events = sys.events.clone();
    wait_for(|| events.annulled().len() == 2).await;
    let statuses = sys.events.annulled().iter().map(|e| e.status).collect::<Vec<_>>();
    assert!(statuses.contains(&OrderStatusType::Cancelled));
    assert!(statuses.contains(&OrderStatusType::Expired));
    sys.tear_down().await;
}

#[tokio::test]
async fn a_submitted_txid_cannot_claim_another_orders_exact_payment() {
    let config = EngineConfig {
        match_tolerance: Litoshi::from(1),
        uniquifier: AmountUniquifier::new(37, 38).unwrap(),
        ..Default::default()
    };
    let sys = TestSystem::shared(config).await;
    let alice = sys.api.initiate_order("alice", sys.product_id).await.unwrap();
    let bob = sys.api.initiate_order("bob", sys.product_id).await.unwrap();
    assert_eq!(alice.required_amount.abs_diff(bob.required_amount), 1);

    // Bob pays his amount exactly. It is within tolerance of Alice's amount, but it is Bob's payment.
    sys.chain.add_payment(&txid(5), SHARED_ADDRESS, bob.required_amount, 1);
    let result = sys.api.submit_txid(alice.order_id, &txid(5)).await.unwrap();
    assert_eq!(
        result,
        TxidVerification::AmountMismatch { expected: alice.required_amount, received: bob.required_amount }
    );
    sys.api.reconcile().await.unwrap();
    assert_eq!(sys.api.check_payment(bob.order_id).await.unwrap().status, OrderStatusType::Paid);
    assert_eq!(sys.api.check_payment(alice.order_id).await.unwrap().status, OrderStatusType::Pending);

    // With no exact competitor left, the same amount is within tolerance for Alice
    sys.chain.add_payment(&txid(6), SHARED_ADDRESS, bob.required_amount, 1);
    let result = sys.api.submit_txid(alice.order_id, &txid(6)).await.unwrap();
    assert!(matches!(result, TxidVerification::Credited { ref status } if status.is_paid()));
    sys.tear_down().await;
}

#[tokio::test]
async fn customers_can_submit_deposit_txids() {
    let sys = TestSystem::per_customer(EngineConfig::default()).await;
    let invoice = sys.api.initiate_order("carol", sys.product_id).await.unwrap();
    let address = invoice.target_address.clone();

    sys.chain.add_payment(&txid(1), &address, Litoshi::from(10_000_000), 0);
    let result = sys.api.submit_txid(invoice.order_id, &txid(1)).await.unwrap();
    assert_eq!(result, TxidVerification::Unconfirmed { confirmations: 0, required: 1 });
    assert_eq!(sys.api.get_balance("carol").await.unwrap(), Litoshi::from(0));

    sys.chain.set_confirmations(&txid(1), 1);
    let result = sys.api.submit_txid(invoice.order_id, &txid(1)).await.unwrap();
    assert!(matches!(result, TxidVerification::Credited { ref status } if status.status == OrderStatusType::Pending));
    assert_eq!(sys.api.get_balance("carol").await.unwrap(), Litoshi::from(10_000_000));

    let result = sys.api.submit_txid(invoice.order_id, &txid(1)).await.unwrap();
    assert!(matches!(result, TxidVerification::AlreadyCredited { .. }));
    assert_eq!(sys.api.get_balance("carol").await.unwrap(), Litoshi::from(10_000_000));

    // A deposit the ledger fails to record is reported as a failure, not as already credited
    sqlx::query(
        "CREATE TRIGGER reject_credits BEFORE INSERT ON credited_transactions BEGIN SELECT RAISE(ABORT, 'disk full'); \
         END;",
    )
    .execute(sys.db.pool())
    .await
    .unwrap();
    sys.chain.add_payment(&txid(2), &address, Litoshi::from(20_000_000), 1);
    let err = sys.api.submit_txid(invoice.order_id, &txid(2)).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::DatabaseError(_)));
    assert_eq!(sys.api.get_balance("carol").await.unwrap(), Litoshi::from(10_000_000));

    sqlx::query("DROP TRIGGER reject_credits;").execute(sys.db.pool()).await.unwrap();
    let result = sys.api.submit_txid(invoice.order_id, &txid(2)).await.unwrap();
    assert!(matches!(result, TxidVerification::Credited { ref status } if status.is_paid()));
    assert_eq!(sys.api.get_balance("carol").await.unwrap(), Litoshi::from(5_000_000));
    sys.tear_down().await;
}
