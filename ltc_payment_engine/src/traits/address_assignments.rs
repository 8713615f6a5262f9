use chrono::{DateTime, Utc};

use crate::{
    address::{AddressDeriver, AllocationError},
    db_types::AddressAssignment,
    traits::LedgerError,
};

/// Storage for per-customer receiving addresses.
#[allow(async_fn_in_trait)]
pub trait AddressAssignments {
    async fn fetch_assignment(&self, customer_id: &str) -> Result<Option<AddressAssignment>, LedgerError>;

    async fn fetch_assignment_by_address(&self, address: &str) -> Result<Option<AddressAssignment>, LedgerError>;

    /// Bumps `last_activity_at` for the customer's assignment, returning it. `None` if the customer has no address yet.
    async fn touch_assignment(&self, customer_id: &str) -> Result<Option<AddressAssignment>, LedgerError>;

    /// Assigns the next unused derivation index to the customer and stores the address derived from it.
    ///
    /// The reservation, derivation and storage happen in a single transaction. If the deriver fails, nothing is
    /// stored and [`AllocationError::Derivation`] is returned. If another caller assigned an address to the same customer
    /// concurrently, the stored assignment is returned instead.
    async fn assign_address(
        &self,
        customer_id: &str,
        deriver: &(dyn AddressDeriver + Send + Sync),
    ) -> Result<AddressAssignment, AllocationError>;

    /// All assignments that should be polled: those with activity since `since`, plus those belonging to a customer
    /// with a pending order, however old.
    async fn fetch_active_assignments(&self, since: DateTime<Utc>) -> Result<Vec<AddressAssignment>, LedgerError>;
}
