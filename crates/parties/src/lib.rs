//! Counterparties domain module (event-sourced).
//!
//! Deals and receipts reference counterparties by id; they never own them.

pub mod counterparty;

pub use counterparty::{
    ArchiveCounterparty, ContactInfo, Counterparty, CounterpartyArchived, CounterpartyCommand,
    CounterpartyEvent, CounterpartyId, CounterpartyRegistered, CounterpartyStatus,
    CounterpartyUpdated, RegisterCounterparty, UpdateCounterparty,
};
