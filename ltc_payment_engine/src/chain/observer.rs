use std::{future::Future, time::Duration};

use log::*;
use lpg_common::Litoshi;

use crate::chain::{AddressActivity, ChainDataError, ChainDataSource, Depth, PaymentSighting};

pub const DEFAULT_MIN_CONFIRMATIONS: u64 = 1;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The result of looking up a single, customer-supplied transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionObservation {
    /// The data source could not be reached. Nothing is known about the transaction.
    Unavailable,
    /// The data source does not know the transaction.
    NotFound,
    /// The transaction exists, but does not pay the address.
    NoPayment,
    /// The transaction pays the address, but is not yet deep enough to be credited.
    Unconfirmed(PaymentSighting),
    Confirmed(PaymentSighting),
}

/// Polls a [`ChainDataSource`] and turns its reports into creditable [`PaymentSighting`]s.
///
/// The observer holds no mutable state, so it can be cloned freely and called concurrently for different addresses.
/// It never returns an error: a failed or slow data source is logged and treated as "nothing new", and the next poll
/// tries again.
#[derive(Debug, Clone)]
pub struct ChainObserver<C> {
    source: C,
    min_confirmations: u64,
    timeout: Duration,
}

impl<C> ChainObserver<C> {
    pub fn new(source: C, min_confirmations: u64, timeout: Duration) -> Self {
        Self { source, min_confirmations, timeout }
    }

    pub fn min_confirmations(&self) -> u64 {
        self.min_confirmations
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn is_confirmed(&self, sighting: &PaymentSighting) -> bool {
        sighting.confirmations >= self.min_confirmations
    }
}

impl<C> ChainObserver<C>
where C: ChainDataSource
{
    /// Returns the sufficiently confirmed incoming payments into `address`.
    ///
    /// Sightings below the confirmation threshold are left out. They are not rejected; the next poll will see them
    /// again with more confirmations.
    pub async fn observe(&self, address: &str) -> Vec<PaymentSighting> {
        let activity = match self.with_timeout(self.source.fetch_address_activity(address)).await {
            Ok(a) => a,
            Err(e) => {
                warn!("🔭️ Could not fetch activity for {address}. Will try again on the next poll. {e}");
                return Vec::new();
            },
        };
        let tip = if needs_chain_height(&activity) { self.chain_height().await } else { None };
        let mut deferred = 0usize;
        let sightings = activity
            .iter()
            .filter_map(|a| to_sighting(a, address, tip))
            .filter(|s| {
                let ok = self.is_confirmed(s);
                if !ok {
                    deferred += 1;
                }
                ok
            })
            .collect::<Vec<_>>();
        debug!(
            "🔭️ {address}: {} transactions reported, {} confirmed payments, {deferred} awaiting confirmation",
            activity.len(),
            sightings.len()
        );
        sightings
    }

    /// Looks up a single transaction and reports whether, and how deeply, it pays `address`.
    pub async fn observe_transaction(&self, txid: &str, address: &str) -> TransactionObservation {
        let activity = match self.with_timeout(self.source.fetch_transaction(txid)).await {
            Ok(Some(a)) => a,
            Ok(None) => return TransactionObservation::NotFound,
            Err(e) => {
                warn!("🔭️ Could not fetch transaction {txid}. {e}");
                return TransactionObservation::Unavailable;
            },
        };
        let tip = if needs_chain_height(std::slice::from_ref(&activity)) { self.chain_height().await } else { None };
        match to_sighting(&activity, address, tip) {
            None => TransactionObservation::NoPayment,
            Some(s) if self.is_confirmed(&s) => TransactionObservation::Confirmed(s),
            Some(s) => TransactionObservation::Unconfirmed(s),
        }
    }

    async fn chain_height(&self) -> Option<u64> {
        match self.with_timeout(self.source.chain_height()).await {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("🔭️ Could not fetch the chain height. Mined transactions will be treated as unconfirmed. {e}");
                None
            },
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, ChainDataError>
    where F: Future<Output = Result<T, ChainDataError>> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| ChainDataError::Timeout)?
    }
}

fn needs_chain_height(activity: &[AddressActivity]) -> bool {
    activity.iter().any(|a| matches!(a.depth, Depth::BlockHeight(Some(_))))
}

/// Confirmations as reported, or derived from the block height. A transaction in block `h` when the tip is at `h` has
/// one confirmation.
fn confirmations(depth: Depth, tip: Option<u64>) -> u64 {
    match (depth, tip) {
        (Depth::Confirmations(n), _) => n,
        (Depth::BlockHeight(None), _) => 0,
        (Depth::BlockHeight(Some(_)), None) => 0,
        (Depth::BlockHeight(Some(h)), Some(tip)) if tip >= h => tip - h + 1,
        (Depth::BlockHeight(Some(_)), Some(_)) => 0,
    }
}

/// Sums the outputs of `activity` that pay `address`. Transactions with nothing incoming produce no sighting, and
/// neither do transactions whose outputs add up to more than an `i64` holds.
fn to_sighting(activity: &AddressActivity, address: &str, tip: Option<u64>) -> Option<PaymentSighting> {
    let mut value = Litoshi::default();
    for output in activity.outputs.iter().filter(|o| o.address == address) {
        let Some(total) = value.checked_add(output.value) else {
            warn!("🔭️ The outputs of {} to {address} overflow. Ignoring the transaction.", activity.txid);
            return None;
        };
        value = total;
    }
    if !value.is_positive() {
        return None;
    }
    Some(PaymentSighting::new(&activity.txid, address, value, confirmations(activity.depth, tip)))
}
