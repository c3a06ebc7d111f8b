//! Domain events, envelopes and the publish/subscribe bus.
//!
//! Durable state lives in the ledgers; the bus only distributes facts that were
//! already recorded (e.g. a finalized deal handed off to document generation).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
