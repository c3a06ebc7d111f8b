//! Deal ledger: append-only record of committed shipments.
//!
//! Appending assigns the next document number; numbers start at 1 and have no gaps.
//! [`StoredDealLedger`] keeps each deal as a `shipping.deal` stream in the event
//! store, so deals and their numbering survive a restart.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use depot_core::{DomainError, ExpectedVersion, Money};
use depot_inventory::ItemId;
use depot_parties::CounterpartyId;
use depot_shipping::{Deal, DealId, DealRecorded, PendingDeal};

use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DealLedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("deal {0} is already recorded")]
    Duplicate(DealId),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("deal ledger lock poisoned")]
    Poisoned,
}

/// Append-only deal storage.
pub trait DealLedger: Send + Sync {
    /// Number and store the deal atomically.
    fn append(&self, deal: PendingDeal) -> Result<Deal, DealLedgerError>;

    /// Every deal in document-number order.
    fn all(&self) -> Result<Vec<Deal>, DealLedgerError>;

    fn get(&self, deal_id: DealId) -> Result<Option<Deal>, DealLedgerError> {
        Ok(self.all()?.into_iter().find(|d| d.id() == deal_id))
    }

    fn by_doc_number(&self, doc_number: u64) -> Result<Option<Deal>, DealLedgerError> {
        Ok(self.all()?.into_iter().find(|d| d.doc_number() == doc_number))
    }

    /// Deals created in `[from, to)`.
    fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Deal>, DealLedgerError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|d| d.created_at() >= from && d.created_at() < to)
            .collect())
    }

    /// Unit price most recently charged to `counterparty` for `item`.
    fn last_sale_price(
        &self,
        counterparty: CounterpartyId,
        item: ItemId,
    ) -> Result<Option<Money>, DealLedgerError> {
        Ok(self
            .all()?
            .iter()
            .rev()
            .filter(|d| d.counterparty_id() == counterparty)
            .find_map(|d| {
                d.lines()
                    .iter()
                    .rev()
                    .find(|l| l.item_id == item)
                    .map(|l| l.unit_price)
            }))
    }
}

impl<L> DealLedger for Arc<L>
where
    L: DealLedger + ?Sized,
{
    fn append(&self, deal: PendingDeal) -> Result<Deal, DealLedgerError> {
        (**self).append(deal)
    }

    fn all(&self) -> Result<Vec<Deal>, DealLedgerError> {
        (**self).all()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDealLedger {
    deals: RwLock<Vec<Deal>>,
}

impl InMemoryDealLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.deals.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DealLedger for InMemoryDealLedger {
    fn append(&self, deal: PendingDeal) -> Result<Deal, DealLedgerError> {
        let mut deals = self.deals.write().map_err(|_| DealLedgerError::Poisoned)?;
        if deals.iter().any(|d| d.id() == deal.id) {
            return Err(DealLedgerError::Duplicate(deal.id));
        }

        let doc_number = deals.last().map(|d| d.doc_number()).unwrap_or(0) + 1;
        let deal = deal.numbered(doc_number)?;
        deals.push(deal.clone());
        Ok(deal)
    }

    fn all(&self) -> Result<Vec<Deal>, DealLedgerError> {
        let deals = self.deals.read().map_err(|_| DealLedgerError::Poisoned)?;
        Ok(deals.clone())
    }
}

/// Deal ledger over an event store: one stream per deal holding its
/// `DealRecorded` event.
pub struct StoredDealLedger<S> {
    store: S,
    deals: RwLock<Vec<Deal>>,
}

impl<S> core::fmt::Debug for StoredDealLedger<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoredDealLedger").finish_non_exhaustive()
    }
}

impl<S: EventStore> StoredDealLedger<S> {
    /// Rebuild the ledger from the deal streams in `store`. Document numbers must
    /// run 1, 2, … without gaps or repeats.
    pub fn open(store: S) -> Result<Self, DealLedgerError> {
        let mut deals = Vec::new();
        for aggregate_id in store.stream_ids(DealRecorded::AGGREGATE_TYPE)? {
            for stored in store.load_stream(aggregate_id)? {
                let recorded: DealRecorded = stored.decode()?;
                deals.push(recorded.deal);
            }
        }
        deals.sort_by_key(|d| d.doc_number());

        for (expected, deal) in (1u64..).zip(&deals) {
            if deal.doc_number() != expected {
                return Err(DomainError::invariant(format!(
                    "deal {} carries document number {} where {expected} was expected",
                    deal.id(),
                    deal.doc_number()
                ))
                .into());
            }
        }

        tracing::info!(deals = deals.len(), "deal ledger opened");
        Ok(Self {
            store,
            deals: RwLock::new(deals),
        })
    }
}

impl<S: EventStore> DealLedger for StoredDealLedger<S> {
    fn append(&self, deal: PendingDeal) -> Result<Deal, DealLedgerError> {
        let mut deals = self.deals.write().map_err(|_| DealLedgerError::Poisoned)?;
        if deals.iter().any(|d| d.id() == deal.id) {
            return Err(DealLedgerError::Duplicate(deal.id));
        }

        let doc_number = deals.last().map(|d| d.doc_number()).unwrap_or(0) + 1;
        let deal = deal.numbered(doc_number)?;
        let recorded = DealRecorded {
            deal: deal.clone(),
            occurred_at: deal.created_at(),
        };
        let event = UncommittedEvent::from_typed(deal.id().0, DealRecorded::AGGREGATE_TYPE, &recorded)?;
        self.store.append(vec![event], ExpectedVersion::Exact(0))?;

        deals.push(deal.clone());
        Ok(deal)
    }

    fn all(&self) -> Result<Vec<Deal>, DealLedgerError> {
        let deals = self.deals.read().map_err(|_| DealLedgerError::Poisoned)?;
        Ok(deals.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use depot_core::{AggregateId, OperatorId};
    use depot_shipping::{DealLine, DraftId};

    use crate::event_store::InMemoryEventStore;

    fn test_item_id() -> ItemId {
        ItemId::new(AggregateId::new())
    }

    fn test_counterparty_id() -> CounterpartyId {
        CounterpartyId::new(AggregateId::new())
    }

    fn pending(
        counterparty: CounterpartyId,
        at: DateTime<Utc>,
        lines: &[(ItemId, u64, i64)],
    ) -> PendingDeal {
        let mut deal = PendingDeal::new(
            DraftId::new(AggregateId::new()),
            counterparty,
            "AIK",
            OperatorId::new("op").unwrap(),
            at,
        );
        for (i, (item, qty, price)) in lines.iter().enumerate() {
            deal.lines.push(
                DealLine::new(
                    i as u32 + 1,
                    *item,
                    1,
                    "item",
                    *qty,
                    Money::from_minor(*price),
                    Money::from_minor(100),
                )
                .unwrap(),
            );
        }
        deal
    }

    #[test]
    fn doc_numbers_are_sequential_from_one() {
        let ledger = InMemoryDealLedger::new();
        let cp = test_counterparty_id();
        let item = test_item_id();

        let first = ledger.append(pending(cp, Utc::now(), &[(item, 1, 150)])).unwrap();
        let second = ledger.append(pending(cp, Utc::now(), &[(item, 2, 150)])).unwrap();

        assert_eq!(first.doc_number(), 1);
        assert_eq!(second.doc_number(), 2);
        assert_eq!(ledger.by_doc_number(2).unwrap(), Some(second));
    }

    #[test]
    fn rejected_append_does_not_consume_a_number() {
        let ledger = InMemoryDealLedger::new();
        let cp = test_counterparty_id();

        assert!(ledger.append(pending(cp, Utc::now(), &[])).is_err());
        let deal = ledger
            .append(pending(cp, Utc::now(), &[(test_item_id(), 1, 1)]))
            .unwrap();
        assert_eq!(deal.doc_number(), 1);
    }

    #[test]
    fn same_deal_cannot_be_recorded_twice() {
        let ledger = InMemoryDealLedger::new();
        let deal = pending(test_counterparty_id(), Utc::now(), &[(test_item_id(), 1, 1)]);

        ledger.append(deal.clone()).unwrap();
        assert_eq!(ledger.append(deal.clone()), Err(DealLedgerError::Duplicate(deal.id)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn last_sale_price_is_per_counterparty_and_item() {
        let ledger = InMemoryDealLedger::new();
        let (a, b) = (test_counterparty_id(), test_counterparty_id());
        let (salmon, trout) = (test_item_id(), test_item_id());

        ledger.append(pending(a, Utc::now(), &[(salmon, 1, 1200)])).unwrap();
        ledger
            .append(pending(b, Utc::now(), &[(salmon, 1, 1500), (trout, 1, 900)]))
            .unwrap();
        ledger.append(pending(a, Utc::now(), &[(salmon, 1, 1250)])).unwrap();

        assert_eq!(ledger.last_sale_price(a, salmon).unwrap(), Some(Money::from_minor(1250)));
        assert_eq!(ledger.last_sale_price(b, salmon).unwrap(), Some(Money::from_minor(1500)));
        assert_eq!(ledger.last_sale_price(a, trout).unwrap(), None);
    }

    #[test]
    fn between_is_half_open() {
        let ledger = InMemoryDealLedger::new();
        let cp = test_counterparty_id();
        let t0 = Utc::now();
        let item = test_item_id();

        ledger.append(pending(cp, t0, &[(item, 1, 1)])).unwrap();
        ledger
            .append(pending(cp, t0 + Duration::hours(1), &[(item, 1, 1)]))
            .unwrap();

        assert_eq!(ledger.between(t0, t0 + Duration::hours(1)).unwrap().len(), 1);
        assert_eq!(ledger.between(t0, t0 + Duration::hours(2)).unwrap().len(), 2);
    }

    #[test]
    fn stored_deals_and_numbering_survive_reopen() {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = StoredDealLedger::open(store.clone()).unwrap();
        let cp = test_counterparty_id();
        let item = test_item_id();

        ledger.append(pending(cp, Utc::now(), &[(item, 1, 150)])).unwrap();
        ledger.append(pending(cp, Utc::now(), &[(item, 2, 175)])).unwrap();

        let reopened = StoredDealLedger::open(store).unwrap();
        assert_eq!(reopened.all().unwrap(), ledger.all().unwrap());
        assert_eq!(reopened.last_sale_price(cp, item).unwrap(), Some(Money::from_minor(175)));

        let third = reopened.append(pending(cp, Utc::now(), &[(item, 1, 150)])).unwrap();
        assert_eq!(third.doc_number(), 3);
    }

    #[test]
    fn stored_ledger_refuses_duplicates_without_writing() {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = StoredDealLedger::open(store.clone()).unwrap();
        let deal = pending(test_counterparty_id(), Utc::now(), &[(test_item_id(), 1, 1)]);

        ledger.append(deal.clone()).unwrap();
        assert_eq!(ledger.append(deal.clone()), Err(DealLedgerError::Duplicate(deal.id)));
        assert!(ledger.append(pending(test_counterparty_id(), Utc::now(), &[])).is_err());
        assert_eq!(store.stream_ids(DealRecorded::AGGREGATE_TYPE).unwrap().len(), 1);
    }

    #[test]
    fn gap_in_stored_numbers_is_refused_on_open() {
        let store = Arc::new(InMemoryEventStore::new());
        let deal = pending(test_counterparty_id(), Utc::now(), &[(test_item_id(), 1, 1)])
            .numbered(2)
            .unwrap();
        let event = UncommittedEvent::from_typed(
            deal.id().0,
            DealRecorded::AGGREGATE_TYPE,
            &DealRecorded {
                occurred_at: deal.created_at(),
                deal,
            },
        )
        .unwrap();
        store.append(vec![event], ExpectedVersion::Exact(0)).unwrap();

        let err = StoredDealLedger::open(store).unwrap_err();
        assert!(matches!(err, DealLedgerError::Domain(DomainError::InvariantViolation(_))));
    }
}
