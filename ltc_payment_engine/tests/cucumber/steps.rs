use std::str::FromStr;

use cucumber::{given, then, when};
use lpg_common::{Cents, Litoshi};
use ltc_payment_engine::{config::EngineConfig, uniquifier::AmountUniquifier};

use crate::{
    cucumber::StoreWorld,
    support::{txid, wait_for, TestSystem, SHARED_ADDRESS},
};

fn ltc(amount: &str) -> Litoshi {
    Litoshi::from_str(amount).expect("Not a valid LTC amount")
}

#[given(expr = "a storefront on the shared address with an amount offset of {int} litoshi")]
async fn shared_storefront(world: &mut StoreWorld, offset: i64) {
    let config = EngineConfig { uniquifier: AmountUniquifier::new(offset, offset).unwrap(), ..Default::default() };
    world.system = Some(TestSystem::shared(config).await);
}

#[given("a storefront with per-customer addresses")]
async fn per_customer_storefront(world: &mut StoreWorld) {
    world.system = Some(TestSystem::per_customer(EngineConfig::default()).await);
}

#[given(expr = "LTC trades at ${int}")]
async fn set_rate(world: &mut StoreWorld, dollars: i64) {
    world.system().rates.set_rate(Some(Cents::from_units(dollars)));
}

#[when(expr = "'{word}' orders the widget")]
async fn order_widget(world: &mut StoreWorld, customer_id: String) {
    let sys = world.system();
    let invoice = sys.api.initiate_order(&customer_id, sys.product_id).await.expect("Error creating the order");
    world.invoices.insert(customer_id, invoice);
}

#[when(expr = "payment {int} of {word} LTC to the address of '{word}' has {int} confirmation(s)")]
async fn payment_seen(world: &mut StoreWorld, n: u64, amount: String, customer_id: String, confirmations: u64) {
    let address = world.invoice(&customer_id).target_address.clone();
    world.system().chain.add_payment(&txid(n), &address, ltc(&amount), confirmations);
}

#[when(expr = "{int} block(s) is/are mined")]
async fn mine(world: &mut StoreWorld, blocks: u64) {
    world.system().chain.mine_blocks(blocks);
}

#[when("the reconciler runs")]
async fn reconcile(world: &mut StoreWorld) {
    world.system().api.reconcile().await.expect("Reconciliation failed");
}

#[when(expr = "'{word}' checks the payment")]
async fn check_payment(world: &mut StoreWorld, customer_id: String) {
    let order_id = world.invoice(&customer_id).order_id;
    world.system().api.check_payment(order_id).await.expect("Error checking the payment");
}

#[then(expr = "'{word}' is asked to pay {word} LTC to the merchant address")]
async fn asked_to_pay_shared(world: &mut StoreWorld, customer_id: String, amount: String) {
    let invoice = world.invoice(&customer_id);
    assert_eq!(invoice.target_address, SHARED_ADDRESS);
    assert_eq!(invoice.required_amount, ltc(&amount));
}

#[then(expr = "'{word}' is asked to pay {word} LTC")]
async fn asked_to_pay(world: &mut StoreWorld, customer_id: String, amount: String) {
    assert_eq!(world.invoice(&customer_id).required_amount, ltc(&amount));
}

#[then(expr = "the order of '{word}' is {word}")]
async fn order_status(world: &mut StoreWorld, customer_id: String, status: String) {
    let order_id = world.invoice(&customer_id).order_id;
    let order = world.system().api.fetch_order(order_id).await.unwrap().expect("Order does not exist");
    assert_eq!(order.status.to_string(), status);
}

#[then(expr = "the balance of '{word}' is {word} LTC")]
async fn balance(world: &mut StoreWorld, customer_id: String, amount: String) {
    let balance = world.system().api.get_balance(&customer_id).await.unwrap();
    assert_eq!(balance, ltc(&amount));
}

#[then(expr = "'{word}' has been notified of {int} paid order(s)")]
async fn notified(world: &mut StoreWorld, customer_id: String, count: usize) {
    let events = world.system().events.clone();
    let paid_for = |events: &crate::support::EventLog| {
        events.paid().iter().filter(|e| e.order.customer_id == customer_id).count()
    };
    wait_for(|| paid_for(&events) >= count).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(paid_for(&events), count);
}
