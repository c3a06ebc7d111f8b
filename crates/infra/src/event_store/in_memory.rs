use std::collections::HashMap;
use std::sync::RwLock;

use depot_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Streams {
    by_id: HashMap<AggregateId, Vec<StoredEvent>>,
    creation_order: Vec<AggregateId>,
}

/// In-memory append-only event store for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut streams = self.streams.write().map_err(|_| EventStoreError::Poisoned)?;
        let Streams {
            by_id,
            creation_order,
        } = &mut *streams;

        let stream = by_id.entry(aggregate_id).or_insert_with(|| {
            creation_order.push(aggregate_id);
            Vec::new()
        });
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams.by_id.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn stream_ids(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams
            .creation_order
            .iter()
            .filter(|id| {
                streams
                    .by_id
                    .get(*id)
                    .and_then(|s| s.first())
                    .is_some_and(|e| e.aggregate_type == aggregate_type)
            })
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({"n": 1}),
        }
    }

    #[test]
    fn append_assigns_gap_free_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![event(id, "a"), event(id, "a")], ExpectedVersion::Exact(0))
            .unwrap();
        let second = store.append(vec![event(id, "a")], ExpectedVersion::Exact(2)).unwrap();

        assert_eq!(first[1].sequence_number, 2);
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![event(id, "a")], ExpectedVersion::Exact(0)).unwrap();

        let err = store
            .append(vec![event(id, "a")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn stream_type_is_stable() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![event(id, "a")], ExpectedVersion::Any).unwrap();

        assert!(matches!(
            store.append(vec![event(id, "b")], ExpectedVersion::Any),
            Err(EventStoreError::AggregateTypeMismatch(_))
        ));
    }

    #[test]
    fn stream_ids_filter_by_type_in_creation_order() {
        let store = InMemoryEventStore::new();
        let (x, y, z) = (AggregateId::new(), AggregateId::new(), AggregateId::new());
        store.append(vec![event(x, "item")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(y, "party")], ExpectedVersion::Any).unwrap();
        store.append(vec![event(z, "item")], ExpectedVersion::Any).unwrap();

        assert_eq!(store.stream_ids("item").unwrap(), vec![x, z]);
        assert!(store.load_stream(AggregateId::new()).unwrap().is_empty());
    }
}
