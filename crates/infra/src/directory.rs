//! Counterparty directory (admin-maintained).

use chrono::{DateTime, Utc};

use depot_core::{AggregateId, DomainError};
use depot_parties::{
    ArchiveCounterparty, ContactInfo, Counterparty, CounterpartyCommand, CounterpartyId,
    RegisterCounterparty, UpdateCounterparty,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

pub const COUNTERPARTY_AGGREGATE_TYPE: &str = "parties.counterparty";

fn make(id: AggregateId) -> Counterparty {
    Counterparty::empty(CounterpartyId::new(id))
}

#[derive(Debug)]
pub struct CounterpartyDirectory<S> {
    dispatcher: CommandDispatcher<S>,
}

impl<S: EventStore> CounterpartyDirectory<S> {
    pub fn new(store: S) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
        }
    }

    pub fn register(
        &self,
        name: &str,
        contact: Option<ContactInfo>,
        now: DateTime<Utc>,
    ) -> Result<Counterparty, DispatchError> {
        let counterparty_id = CounterpartyId::new(AggregateId::new());
        let counterparty = self.dispatcher.dispatch(
            counterparty_id.0,
            COUNTERPARTY_AGGREGATE_TYPE,
            CounterpartyCommand::RegisterCounterparty(RegisterCounterparty {
                counterparty_id,
                name: name.to_string(),
                contact,
                occurred_at: now,
            }),
            make,
        )?;
        tracing::info!(%counterparty_id, name = counterparty.name(), "counterparty registered");
        Ok(counterparty)
    }

    pub fn update(
        &self,
        counterparty_id: CounterpartyId,
        name: Option<String>,
        contact: Option<ContactInfo>,
        now: DateTime<Utc>,
    ) -> Result<Counterparty, DispatchError> {
        self.dispatcher.dispatch(
            counterparty_id.0,
            COUNTERPARTY_AGGREGATE_TYPE,
            CounterpartyCommand::UpdateCounterparty(UpdateCounterparty {
                counterparty_id,
                name,
                contact,
                occurred_at: now,
            }),
            make,
        )
    }

    pub fn archive(
        &self,
        counterparty_id: CounterpartyId,
        now: DateTime<Utc>,
    ) -> Result<Counterparty, DispatchError> {
        self.dispatcher.dispatch(
            counterparty_id.0,
            COUNTERPARTY_AGGREGATE_TYPE,
            CounterpartyCommand::ArchiveCounterparty(ArchiveCounterparty {
                counterparty_id,
                occurred_at: now,
            }),
            make,
        )
    }

    /// `None` when no such counterparty was ever registered.
    pub fn get(&self, counterparty_id: CounterpartyId) -> Result<Option<Counterparty>, DispatchError> {
        let counterparty: Counterparty = self.dispatcher.load(counterparty_id.0, make)?;
        Ok(counterparty.is_created().then_some(counterparty))
    }

    /// Counterparty that may take part in a new shipment or receipt.
    pub fn require_active(&self, counterparty_id: CounterpartyId) -> Result<Counterparty, DispatchError> {
        match self.get(counterparty_id)? {
            Some(cp) if cp.can_transact() => Ok(cp),
            Some(_) => Err(DomainError::invariant(format!(
                "counterparty {counterparty_id} is archived"
            ))
            .into()),
            None => Err(DomainError::not_found("counterparty").into()),
        }
    }

    /// All counterparties ordered by name.
    pub fn list(&self) -> Result<Vec<Counterparty>, DispatchError> {
        let mut all = self
            .dispatcher
            .store()
            .stream_ids(COUNTERPARTY_AGGREGATE_TYPE)?
            .into_iter()
            .map(|id| self.dispatcher.load(id, make))
            .collect::<Result<Vec<Counterparty>, _>>()?;
        all.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(all)
    }

    /// Case-insensitive exact name lookup.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Counterparty>, DispatchError> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .list()?
            .into_iter()
            .find(|cp| cp.name().to_lowercase() == wanted))
    }
}
