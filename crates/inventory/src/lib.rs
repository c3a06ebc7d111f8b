//! Inventory domain module (event-sourced).
//!
//! Items, their acquisition lots and cost attribution, plus the reservation book
//! used while shipments commit. Pure domain logic: no IO, no locking, no storage.

pub mod costing;
pub mod error;
pub mod item;
pub mod reservation;

pub use costing::{AcquisitionLot, CostAttribution, CostBasis, CostPolicy, LotDraw};
pub use error::InventoryError;
pub use item::{
    ConsumeStock, CreateItem, InventoryCommand, InventoryEvent, Item, ItemCreated, ItemDetails,
    ItemDetailsUpdated, ItemId, ReceiveStock, StockConsumed, StockReceived, UpdateItemDetails,
};
pub use reservation::{ReservationBook, ReservationId, ReservationState, ReservationToken};
