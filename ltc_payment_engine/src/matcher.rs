//! # Payment matching
//!
//! Pure functions that decide which observed payments settle which orders (shared-address mode) or belong to which
//! customers (per-customer mode). Nothing here touches storage: the matcher proposes, and the ledger's uniqueness
//! constraint has the final word on whether a payment is credited.
//!
//! Only confirmed sightings reach the matcher. Sightings that match nothing are simply not returned; they are not
//! recorded anywhere, so they stay eligible on later passes.
use std::collections::{HashMap, HashSet};

use lpg_common::Litoshi;

use crate::{
    chain::PaymentSighting,
    db_types::{AddressAssignment, CreditedTransaction, Order},
};

/// The largest amount tolerance the matcher accepts, in litoshi.
pub const MAX_TOLERANCE: i64 = 1;

/// The identity of a payment, as far as crediting is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CreditKey {
    pub address: String,
    pub txid: String,
    pub value: Litoshi,
}

impl From<&PaymentSighting> for CreditKey {
    fn from(s: &PaymentSighting) -> Self {
        Self { address: s.address.clone(), txid: s.txid.clone(), value: s.value }
    }
}

impl From<&CreditedTransaction> for CreditKey {
    fn from(c: &CreditedTransaction) -> Self {
        Self { address: c.address.clone(), txid: c.txid.clone(), value: c.value }
    }
}

pub fn credited_keys(credits: &[CreditedTransaction]) -> HashSet<CreditKey> {
    credits.iter().map(CreditKey::from).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountMatch {
    pub order: Order,
    pub sighting: PaymentSighting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositMatch {
    pub customer_id: String,
    pub sighting: PaymentSighting,
}

/// Tolerances are clamped to `0..=MAX_TOLERANCE`.
pub fn clamp_tolerance(tolerance: Litoshi) -> Litoshi {
    Litoshi::from(tolerance.value().clamp(0, MAX_TOLERANCE))
}

/// Pairs sightings on shared addresses with pending orders by amount.
///
/// * Orders are considered oldest first (`created_at`, then `id`), so when two pending orders ask for the same amount,
///   the older one is matched.
/// * A sighting can only match an order whose target address it paid into.
/// * Exact matches are made before any within-tolerance match, so a 1-litoshi tolerance never steals an order from a
///   payment that matches it exactly.
/// * Each sighting matches at most one order, and each order at most one sighting.
/// * Sightings in `already_credited` are ignored.
pub fn match_by_amount(
    pending: &[Order],
    sightings: &[PaymentSighting],
    already_credited: &HashSet<CreditKey>,
    tolerance: Litoshi,
) -> Vec<AmountMatch> {
    let tolerance = clamp_tolerance(tolerance).value().unsigned_abs();
    let mut orders = pending.iter().filter(|o| o.is_pending()).collect::<Vec<_>>();
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    let candidates = sightings
        .iter()
        .filter(|s| {
            let key = CreditKey::from(*s);
            !already_credited.contains(&key) && seen.insert(key)
        })
        .collect::<Vec<_>>();

    let mut order_taken = vec![false; orders.len()];
    let mut sighting_taken = vec![false; candidates.len()];
    let mut matches = Vec::new();
    let passes = if tolerance == 0 { vec![0] } else { vec![0, tolerance] };
    for max_diff in passes {
        for (si, sighting) in candidates.iter().enumerate() {
            if sighting_taken[si] {
                continue;
            }
            let found = orders.iter().enumerate().find(|(oi, order)| {
                !order_taken[*oi]
                    && order.target_address == sighting.address
                    && order.required_amount.abs_diff(sighting.value) <= max_diff
            });
            if let Some((oi, order)) = found {
                order_taken[oi] = true;
                sighting_taken[si] = true;
                matches.push(AmountMatch { order: (*order).clone(), sighting: (*sighting).clone() });
            }
        }
    }
    matches
}

/// Assigns every uncredited sighting on a customer's address to that customer.
pub fn match_by_address(
    assignments: &[AddressAssignment],
    sightings: &[PaymentSighting],
    already_credited: &HashSet<CreditKey>,
) -> Vec<DepositMatch> {
    let owners = assignments.iter().map(|a| (a.address.as_str(), a.customer_id.as_str())).collect::<HashMap<_, _>>();
    let mut seen = HashSet::new();
    sightings
        .iter()
        .filter_map(|s| {
            let customer_id = owners.get(s.address.as_str())?;
            let key = CreditKey::from(s);
            if already_credited.contains(&key) || !seen.insert(key) {
                return None;
            }
            Some(DepositMatch { customer_id: customer_id.to_string(), sighting: s.clone() })
        })
        .collect()
}
