//! Event-sourced aggregates: items, counterparties and goods receipts.

use crate::error::{DomainError, DomainResult};

pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Count of events applied so far; equals the stream's last sequence number.
    fn version(&self) -> u64;
}

/// Version a writer expects its stream to be at when appending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "stream moved on: expected {self:?}, found version {actual}"
        )))
    }
}

/// Decide/evolve split: `handle` inspects state and returns events without
/// touching it; `apply` folds one event in and bumps the version. No IO on either
/// side. Callers persist the events first and apply them only after the append
/// succeeded, so a refused append leaves the cached instance untouched.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Apply freshly committed events in order.
    fn apply_all(&mut self, events: &[Self::Event]) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        id: u8,
        total: u64,
        version: u64,
    }

    impl AggregateRoot for Counter {
        type Id = u8;

        fn id(&self) -> &u8 {
            &self.id
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    impl Aggregate for Counter {
        type Command = u64;
        type Event = u64;
        type Error = DomainError;

        fn apply(&mut self, event: &u64) {
            self.total += event;
            self.version += 1;
        }

        fn handle(&self, command: &u64) -> Result<Vec<u64>, DomainError> {
            if *command == 0 {
                return Err(DomainError::validation("zero"));
            }
            Ok(vec![*command])
        }
    }

    #[test]
    fn exact_version_rejects_stale_writers() {
        assert!(ExpectedVersion::Exact(3).check(3).is_ok());
        assert!(matches!(
            ExpectedVersion::Exact(2).check(3),
            Err(DomainError::Conflict(_))
        ));
        assert!(ExpectedVersion::Any.check(42).is_ok());
    }

    #[test]
    fn apply_all_advances_version_per_event() {
        let mut counter = Counter::default();
        let events = counter.handle(&5).unwrap();
        assert_eq!(counter.version(), 0);

        counter.apply_all(&events);
        counter.apply_all(&[2, 3]);
        assert_eq!(counter.total, 10);
        assert_eq!(counter.version(), 3);
        assert!(counter.handle(&0).is_err());
    }
}
