//! Append-only event store boundary.
//!
//! Item, counterparty and receipt streams are persisted here; the storage engine is
//! not assumed beyond per-stream atomic append with an optimistic version check.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
