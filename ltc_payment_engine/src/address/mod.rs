//! # Receiving addresses
//!
//! Every order needs a target address. Deployments choose between two modes:
//!
//! * **Shared**: every order pays into the one merchant address. Orders are told apart by their uniquified amount
//!   (see [`crate::uniquifier`]).
//! * **Per-customer**: each customer gets their own address, derived from the merchant's extended public key at the
//!   next unused index. Deposits are told apart by address and credited to the customer's balance.
//!
//! Derivation itself is delegated to an [`AddressDeriver`]. [`XpubDeriver`] is the production implementation.
mod xpub;

use std::{fmt::Debug, sync::Arc};

use log::*;
use thiserror::Error;
pub use xpub::XpubDeriver;

use crate::traits::{AddressAssignments, LedgerError};

/// Derives the receiving address at a given index. Implementations must be deterministic.
pub trait AddressDeriver {
    fn derive_address(&self, index: u32) -> Result<String, DerivationError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DerivationError {
    #[error("The extended public key is invalid: {0}")]
    InvalidKey(String),
    #[error("Derivation index {0} is out of range for non-hardened derivation")]
    IndexOutOfRange(i64),
    #[error("Invalid address prefix: {0}")]
    InvalidPrefix(String),
    #[error("Could not derive address: {0}")]
    DerivationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    #[error("Address derivation failed. This is a configuration problem. {0}")]
    Derivation(#[from] DerivationError),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<LedgerError> for AllocationError {
    fn from(e: LedgerError) -> Self {
        AllocationError::DatabaseError(e.to_string())
    }
}

impl From<sqlx::Error> for AllocationError {
    fn from(e: sqlx::Error) -> Self {
        AllocationError::DatabaseError(e.to_string())
    }
}

#[derive(Clone)]
pub enum AllocationMode {
    Shared(String),
    PerCustomer(Arc<dyn AddressDeriver + Send + Sync>),
}

impl Debug for AllocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationMode::Shared(address) => write!(f, "Shared({address})"),
            AllocationMode::PerCustomer(_) => write!(f, "PerCustomer"),
        }
    }
}

#[derive(Clone)]
pub struct AddressAllocator<B> {
    db: B,
    mode: AllocationMode,
}

impl<B> Debug for AddressAllocator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AddressAllocator({:?})", self.mode)
    }
}

impl<B> AddressAllocator<B> {
    pub fn new(db: B, mode: AllocationMode) -> Self {
        Self { db, mode }
    }

    pub fn mode(&self) -> &AllocationMode {
        &self.mode
    }

    /// The merchant address, if the allocator is running in shared mode.
    pub fn shared_address(&self) -> Option<&str> {
        match &self.mode {
            AllocationMode::Shared(address) => Some(address.as_str()),
            AllocationMode::PerCustomer(_) => None,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared_address().is_some()
    }
}

impl<B> AddressAllocator<B>
where B: AddressAssignments
{
    /// Returns the receiving address for the customer.
    ///
    /// In per-customer mode this is idempotent: the first call assigns and stores an address, every subsequent call
    /// returns the same one (and marks the customer as recently active, so that their address is polled).
    ///
    /// A derivation failure only affects this customer. It is logged as an operator configuration problem and
    /// returned as [`AllocationError::Derivation`].
    pub async fn allocate(&self, customer_id: &str) -> Result<String, AllocationError> {
        let deriver = match &self.mode {
            AllocationMode::Shared(address) => return Ok(address.clone()),
            AllocationMode::PerCustomer(deriver) => deriver,
        };
        if let Some(assignment) = self.db.touch_assignment(customer_id).await? {
            trace!("🏷️ Customer {customer_id} already has address {}", assignment.address);
            return Ok(assignment.address);
        }
        match self.db.assign_address(customer_id, deriver.as_ref()).await {
            Ok(assignment) => {
                info!(
                    "🏷️ Assigned address {} (index {}) to customer {customer_id}",
                    assignment.address, assignment.derivation_index
                );
                Ok(assignment.address)
            },
            Err(AllocationError::Derivation(e)) => {
                error!(
                    "🏷️ Could not derive an address for customer {customer_id}. Check the extended public key \
                     configuration. {e}"
                );
                Err(AllocationError::Derivation(e))
            },
            Err(e) => {
                warn!("🏷️ Could not assign an address to customer {customer_id}. {e}");
                Err(e)
            },
        }
    }
}
