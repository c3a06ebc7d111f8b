//! Outbound shipments: the per-operator draft being assembled and the immutable
//! deal it becomes once committed.
//!
//! Pure domain logic (no IO, no locking, no storage).

pub mod deal;
pub mod draft;
pub mod error;

pub use deal::{Deal, DealId, DealLine, DealRecorded, PendingDeal};
pub use draft::{DraftId, DraftLine, DraftState, NewLine, ShipmentDraft};
pub use error::DraftError;
