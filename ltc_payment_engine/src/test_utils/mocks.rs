//! Scripted stand-ins for the external services, for tests.
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use lpg_common::{Cents, Litoshi};

use crate::{
    address::{AddressDeriver, DerivationError},
    chain::{AddressActivity, ChainDataError, ChainDataSource, Depth, TxOutput},
    rates::{ExchangeRate, RateError, RateSource},
};

#[derive(Default)]
struct ChainState {
    transactions: Vec<AddressActivity>,
    height: u64,
    offline: bool,
    delay: Option<Duration>,
    calls: usize,
}

/// An in-memory chain whose contents the test controls. Clones share the same chain.
#[derive(Clone, Default)]
pub struct ScriptedChainSource {
    state: Arc<Mutex<ChainState>>,
}

impl ScriptedChainSource {
    /// Adds a payment of `value` into `address`. Calling this again with the same txid adds another output to that
    /// transaction.
    pub fn add_payment(&self, txid: &str, address: &str, value: Litoshi, confirmations: u64) {
        self.add_output(txid, address, value, Depth::Confirmations(confirmations));
    }

    /// Like [`Self::add_payment`], but the transaction reports a block height instead of a confirmation count.
    pub fn add_mined_payment(&self, txid: &str, address: &str, value: Litoshi, block_height: Option<u64>) {
        self.add_output(txid, address, value, Depth::BlockHeight(block_height));
    }

    pub fn add_activity(&self, activity: AddressActivity) {
        self.lock().transactions.push(activity);
    }

    pub fn set_confirmations(&self, txid: &str, confirmations: u64) {
        let mut state = self.lock();
        for tx in state.transactions.iter_mut().filter(|t| t.txid == txid) {
            tx.depth = Depth::Confirmations(confirmations);
        }
    }

    /// Adds `n` confirmations to every transaction that reports confirmations.
    pub fn mine_blocks(&self, n: u64) {
        let mut state = self.lock();
        state.height += n;
        for tx in state.transactions.iter_mut() {
            if let Depth::Confirmations(c) = tx.depth {
                tx.depth = Depth::Confirmations(c + n);
            }
        }
    }

    pub fn set_chain_height(&self, height: u64) {
        self.lock().height = height;
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    fn add_output(&self, txid: &str, address: &str, value: Litoshi, depth: Depth) {
        let output = TxOutput { address: address.to_string(), value };
        let mut state = self.lock();
        match state.transactions.iter_mut().find(|t| t.txid == txid) {
            Some(tx) => tx.outputs.push(output),
            None => state.transactions.push(AddressActivity { txid: txid.to_string(), outputs: vec![output], depth }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Counts the call and applies the scripted delay and outage.
    async fn begin_call(&self) -> Result<(), ChainDataError> {
        let (delay, offline) = {
            let mut state = self.lock();
            state.calls += 1;
            (state.delay, state.offline)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if offline {
            return Err(ChainDataError::Unavailable("scripted outage".to_string()));
        }
        Ok(())
    }
}

impl ChainDataSource for ScriptedChainSource {
    async fn chain_height(&self) -> Result<u64, ChainDataError> {
        self.begin_call().await?;
        Ok(self.lock().height)
    }

    async fn fetch_address_activity(&self, address: &str) -> Result<Vec<AddressActivity>, ChainDataError> {
        self.begin_call().await?;
        let state = self.lock();
        let activity = state
            .transactions
            .iter()
            .filter(|t| t.outputs.iter().any(|o| o.address == address))
            .cloned()
            .collect();
        Ok(activity)
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Option<AddressActivity>, ChainDataError> {
        self.begin_call().await?;
        Ok(self.lock().transactions.iter().find(|t| t.txid == txid).cloned())
    }
}

/// A rate source that returns whatever the test sets, or fails when the rate is `None`.
#[derive(Clone)]
pub struct FixedRateSource {
    rate: Arc<Mutex<Option<Cents>>>,
    calls: Arc<AtomicUsize>,
}

impl FixedRateSource {
    pub fn new(rate: Cents) -> Self {
        Self { rate: Arc::new(Mutex::new(Some(rate))), calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn failing() -> Self {
        Self { rate: Arc::new(Mutex::new(None)), calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn set_rate(&self, rate: Option<Cents>) {
        *self.rate.lock().unwrap_or_else(|p| p.into_inner()) = rate;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RateSource for FixedRateSource {
    async fn fetch_rate(&self, currency: &str) -> Result<ExchangeRate, RateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rate = *self.rate.lock().unwrap_or_else(|p| p.into_inner());
        rate.map(|cents| ExchangeRate::new(currency, cents, None))
            .ok_or_else(|| RateError::RateUnavailable("scripted outage".to_string()))
    }
}

/// Derives `ltc1qtest<index>` style addresses, or fails on demand.
#[derive(Clone, Default)]
pub struct FakeDeriver {
    fail: Arc<AtomicBool>,
}

impl FakeDeriver {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl AddressDeriver for FakeDeriver {
    fn derive_address(&self, index: u32) -> Result<String, DerivationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DerivationError::DerivationFailed("scripted failure".to_string()));
        }
        Ok(format!("ltc1qtest{index:06}"))
    }
}
