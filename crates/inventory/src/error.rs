use thiserror::Error;

use depot_core::DomainError;

use crate::item::ItemId;
use crate::reservation::ReservationId;

/// Failures raised by the inventory domain.
///
/// `InsufficientStock` is a normal, operator-correctable outcome.
/// `CostBasisExhausted` means the on-hand/lot invariant is already broken.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u64,
        available: u64,
    },

    #[error("cost basis exhausted for item {item_id}: requested {requested}, remaining {remaining}")]
    CostBasisExhausted {
        item_id: ItemId,
        requested: u64,
        remaining: u64,
    },

    #[error("reservation {reservation} on item {item_id} is not held")]
    ReservationNotHeld {
        item_id: ItemId,
        reservation: ReservationId,
    },
}

impl InventoryError {
    /// Internal-consistency faults must never be retried or shown as user errors.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            InventoryError::CostBasisExhausted { .. }
                | InventoryError::Domain(DomainError::InvariantViolation(_))
        )
    }
}
