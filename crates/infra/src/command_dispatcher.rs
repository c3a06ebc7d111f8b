//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate stream
//!   ↓
//! 2. Rehydrate (apply history in sequence order)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(current version)
//!   ↓
//! 5. Apply the committed events and return the new state
//! ```
//!
//! Counterparties and goods receipts go through here. Items do not: the stock ledger
//! keeps them cached inside per-item critical sections and appends directly.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use depot_events::Event;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("stream {aggregate_id} is out of order at sequence {sequence_number}")]
    CorruptStream {
        aggregate_id: AggregateId,
        sequence_number: u64,
    },
}

/// Rebuild an aggregate from its stored stream.
pub fn rehydrate<A, F>(
    stream: &[StoredEvent],
    aggregate_id: AggregateId,
    make_aggregate: F,
) -> Result<A, DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
    F: FnOnce(AggregateId) -> A,
{
    let mut aggregate = make_aggregate(aggregate_id);
    for (idx, stored) in stream.iter().enumerate() {
        if stored.sequence_number != (idx as u64) + 1 {
            return Err(DispatchError::CorruptStream {
                aggregate_id,
                sequence_number: stored.sequence_number,
            });
        }
        let event: A::Event = stored.decode()?;
        aggregate.apply(&event);
    }
    Ok(aggregate)
}

/// Reusable command execution engine.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: EventStore> CommandDispatcher<S> {
    /// Load and rehydrate; an unknown stream yields the empty aggregate.
    pub fn load<A, F>(&self, aggregate_id: AggregateId, make_aggregate: F) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
        F: FnOnce(AggregateId) -> A,
    {
        let stream = self.store.load_stream(aggregate_id)?;
        rehydrate(&stream, aggregate_id, make_aggregate)
    }

    /// Run `command` against the aggregate and persist the resulting events.
    pub fn dispatch<A, F>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: F,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
        F: FnOnce(AggregateId) -> A,
    {
        let mut aggregate = self.load(aggregate_id, make_aggregate)?;
        let events = aggregate.handle(&command)?;
        if events.is_empty() {
            return Ok(aggregate);
        }

        let uncommitted = events
            .iter()
            .map(|e| UncommittedEvent::from_typed(aggregate_id, aggregate_type, e))
            .collect::<Result<Vec<_>, _>>()?;
        self.store
            .append(uncommitted, ExpectedVersion::Exact(aggregate.version()))?;

        aggregate.apply_all(&events);
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use depot_parties::{
        Counterparty, CounterpartyCommand, CounterpartyId, RegisterCounterparty,
        UpdateCounterparty,
    };

    use crate::event_store::InMemoryEventStore;

    fn register(id: AggregateId, name: &str) -> CounterpartyCommand {
        CounterpartyCommand::RegisterCounterparty(RegisterCounterparty {
            counterparty_id: CounterpartyId::new(id),
            name: name.to_string(),
            contact: None,
            occurred_at: Utc::now(),
        })
    }

    fn make(id: AggregateId) -> Counterparty {
        Counterparty::empty(CounterpartyId::new(id))
    }

    #[test]
    fn dispatch_persists_and_reloads() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = AggregateId::new();

        let cp = dispatcher
            .dispatch(id, "parties.counterparty", register(id, "Vector"), make)
            .unwrap();
        assert_eq!(cp.version(), 1);

        let cp = dispatcher
            .dispatch(
                id,
                "parties.counterparty",
                CounterpartyCommand::UpdateCounterparty(UpdateCounterparty {
                    counterparty_id: CounterpartyId::new(id),
                    name: Some("Vector LLC".to_string()),
                    contact: None,
                    occurred_at: Utc::now(),
                }),
                make,
            )
            .unwrap();
        assert_eq!(cp.name(), "Vector LLC");

        let reloaded: Counterparty = dispatcher.load(id, make).unwrap();
        assert_eq!(reloaded, cp);
    }

    #[test]
    fn domain_rejection_persists_nothing() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = AggregateId::new();

        let err = dispatcher
            .dispatch::<Counterparty, _>(id, "parties.counterparty", register(id, "  "), make)
            .unwrap_err();

        assert!(matches!(err, DispatchError::Domain(DomainError::Validation(_))));
        assert!(dispatcher.store().load_stream(id).unwrap().is_empty());
    }
}
