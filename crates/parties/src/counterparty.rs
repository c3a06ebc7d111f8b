use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use depot_events::Event;

/// Counterparty identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterpartyId(pub AggregateId);

impl CounterpartyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CounterpartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Counterparty lifecycle. Archived counterparties stay referenced by old deals
/// but cannot take part in new shipments or receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyStatus {
    Active,
    Archived,
}

/// Contact metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: Counterparty (customer or supplier; the warehouse trades both ways
/// with the same parties).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterparty {
    id: CounterpartyId,
    name: String,
    contact: ContactInfo,
    status: CounterpartyStatus,
    version: u64,
    created: bool,
}

impl Counterparty {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CounterpartyId) -> Self {
        Self {
            id,
            name: String::new(),
            contact: ContactInfo::default(),
            status: CounterpartyStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CounterpartyId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> CounterpartyStatus {
        self.status
    }

    /// Whether new shipments/receipts may reference this counterparty.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == CounterpartyStatus::Active
    }
}

impl AggregateRoot for Counterparty {
    type Id = CounterpartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCounterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCounterparty {
    pub counterparty_id: CounterpartyId,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateCounterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCounterparty {
    pub counterparty_id: CounterpartyId,
    /// New display name (if None, keep existing).
    pub name: Option<String>,
    /// New contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveCounterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCounterparty {
    pub counterparty_id: CounterpartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterpartyCommand {
    RegisterCounterparty(RegisterCounterparty),
    UpdateCounterparty(UpdateCounterparty),
    ArchiveCounterparty(ArchiveCounterparty),
}

/// Event: CounterpartyRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyRegistered {
    pub counterparty_id: CounterpartyId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CounterpartyUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyUpdated {
    pub counterparty_id: CounterpartyId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CounterpartyArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyArchived {
    pub counterparty_id: CounterpartyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterpartyEvent {
    CounterpartyRegistered(CounterpartyRegistered),
    CounterpartyUpdated(CounterpartyUpdated),
    CounterpartyArchived(CounterpartyArchived),
}

impl Event for CounterpartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CounterpartyEvent::CounterpartyRegistered(_) => "parties.counterparty.registered",
            CounterpartyEvent::CounterpartyUpdated(_) => "parties.counterparty.updated",
            CounterpartyEvent::CounterpartyArchived(_) => "parties.counterparty.archived",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CounterpartyEvent::CounterpartyRegistered(e) => e.occurred_at,
            CounterpartyEvent::CounterpartyUpdated(e) => e.occurred_at,
            CounterpartyEvent::CounterpartyArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Counterparty {
    type Command = CounterpartyCommand;
    type Event = CounterpartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CounterpartyEvent::CounterpartyRegistered(e) => {
                self.id = e.counterparty_id;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.status = CounterpartyStatus::Active;
                self.created = true;
            }
            CounterpartyEvent::CounterpartyUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
            CounterpartyEvent::CounterpartyArchived(_) => {
                self.status = CounterpartyStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CounterpartyCommand::RegisterCounterparty(cmd) => self.handle_register(cmd),
            CounterpartyCommand::UpdateCounterparty(cmd) => self.handle_update(cmd),
            CounterpartyCommand::ArchiveCounterparty(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Counterparty {
    fn ensure_existing(&self, counterparty_id: CounterpartyId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("counterparty"));
        }
        if self.id != counterparty_id {
            return Err(DomainError::invariant("counterparty_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(
        &self,
        cmd: &RegisterCounterparty,
    ) -> Result<Vec<CounterpartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("counterparty already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![CounterpartyEvent::CounterpartyRegistered(CounterpartyRegistered {
            counterparty_id: cmd.counterparty_id,
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(
        &self,
        cmd: &UpdateCounterparty,
    ) -> Result<Vec<CounterpartyEvent>, DomainError> {
        self.ensure_existing(cmd.counterparty_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![CounterpartyEvent::CounterpartyUpdated(CounterpartyUpdated {
            counterparty_id: cmd.counterparty_id,
            name: name.trim().to_string(),
            contact: cmd.contact.clone().unwrap_or_else(|| self.contact.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(
        &self,
        cmd: &ArchiveCounterparty,
    ) -> Result<Vec<CounterpartyEvent>, DomainError> {
        self.ensure_existing(cmd.counterparty_id)?;

        if self.status == CounterpartyStatus::Archived {
            return Err(DomainError::invariant("counterparty is already archived"));
        }

        Ok(vec![CounterpartyEvent::CounterpartyArchived(CounterpartyArchived {
            counterparty_id: cmd.counterparty_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
