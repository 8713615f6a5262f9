use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use ltc_payment_engine::order_objects::OrderInvoice;

use crate::support::TestSystem;

#[derive(Default, World)]
pub struct StoreWorld {
    pub system: Option<TestSystem>,
    /// The latest invoice for each customer
    pub invoices: HashMap<String, OrderInvoice>,
}

impl Debug for StoreWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreWorld({} invoices)", self.invoices.len())
    }
}

impl StoreWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("The storefront has not been set up")
    }

    pub fn invoice(&self, customer_id: &str) -> &OrderInvoice {
        self.invoices.get(customer_id).unwrap_or_else(|| panic!("{customer_id} has not ordered anything"))
    }
}
