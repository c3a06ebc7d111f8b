//! Shipment commit coordinator.
//!
//! Two phases. Reserve every line, visiting items in ascending id order; the first
//! refusal releases everything taken so far and the commit fails cleanly with no
//! stock touched. Then consume every reservation, build the deal and append it.
//! A failure in the second phase is a `PartialCommitFault`: what was consumed stays
//! consumed, unconsumed holds are released, and the draft is aborted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use depot_core::{DomainError, Money, OperatorId};
use depot_events::{EventBus, EventEnvelope};
use depot_inventory::{InventoryError, ItemId, ReservationToken};
use depot_parties::CounterpartyId;
use depot_shipping::{Deal, DealLine, DealRecorded, DraftId, DraftLine, DraftState, PendingDeal, ShipmentDraft};

use crate::command_dispatcher::DispatchError;
use crate::deal_ledger::DealLedger;
use crate::directory::CounterpartyDirectory;
use crate::event_store::EventStore;
use crate::stock_ledger::{LedgerError, StockLedger};

pub type DealEnvelope = EventEnvelope<DealRecorded>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumedLine {
    pub item_id: ItemId,
    pub quantity: u64,
    pub unit_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleasedLine {
    pub item_id: ItemId,
    pub quantity: u64,
}

/// Everything needed to reconcile a commit that failed after consuming stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialCommitFault {
    pub draft_id: DraftId,
    pub operator: OperatorId,
    /// Permanent decrements already recorded; these are not rolled back.
    pub consumed: Vec<ConsumedLine>,
    /// Holds that were released instead of consumed.
    pub released: Vec<ReleasedLine>,
    /// Deal as far as it was built.
    pub deal: PendingDeal,
    pub cause: String,
}

impl core::fmt::Display for PartialCommitFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "draft {} consumed {} line(s), released {}: {}",
            self.draft_id,
            self.consumed.len(),
            self.released.len(),
            self.cause
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("cannot commit a draft that is {state}")]
    InvalidDraftState { state: DraftState },

    #[error("no counterparty chosen for the shipment")]
    MissingCounterparty,

    #[error("unknown counterparty {0}")]
    UnknownCounterparty(CounterpartyId),

    #[error("counterparty {0} is archived")]
    CounterpartyArchived(CounterpartyId),

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u64,
        available: u64,
    },

    #[error("partial commit fault: {0}")]
    PartialCommitFault(Box<PartialCommitFault>),

    #[error(transparent)]
    Ledger(LedgerError),

    #[error("counterparty lookup failed: {0}")]
    Directory(DispatchError),
}

impl CommitError {
    /// Internal-consistency failures: surfaced as hard failures, never retried.
    pub fn is_fault(&self) -> bool {
        match self {
            CommitError::PartialCommitFault(_) | CommitError::Directory(_) => true,
            CommitError::Ledger(e) => e.is_fault(),
            _ => false,
        }
    }
}

impl From<LedgerError> for CommitError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Inventory(InventoryError::InsufficientStock {
                item_id,
                requested,
                available,
            }) => CommitError::InsufficientStock {
                item_id,
                requested,
                available,
            },
            LedgerError::UnknownItem(item_id) => CommitError::UnknownItem(item_id),
            other => CommitError::Ledger(other),
        }
    }
}

fn deal_line(line: &DraftLine, unit_cost: Money) -> Result<DealLine, DomainError> {
    DealLine::new(
        line.line_no,
        line.item_id,
        line.item_code,
        line.item_name.clone(),
        line.quantity,
        line.unit_price,
        unit_cost,
    )
}

pub struct CommitCoordinator<S, D, B> {
    ledger: Arc<StockLedger<S>>,
    directory: Arc<CounterpartyDirectory<S>>,
    deals: D,
    bus: B,
}

impl<S, D, B> CommitCoordinator<S, D, B>
where
    S: EventStore,
    D: DealLedger,
    B: EventBus<DealEnvelope>,
{
    pub fn new(
        ledger: Arc<StockLedger<S>>,
        directory: Arc<CounterpartyDirectory<S>>,
        deals: D,
        bus: B,
    ) -> Self {
        Self {
            ledger,
            directory,
            deals,
            bus,
        }
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    pub fn deals(&self) -> &D {
        &self.deals
    }

    /// Commit `draft` to `counterparty` (or the one chosen on the draft).
    ///
    /// Clean failures leave the draft in `PendingConfirmation` for correction; a
    /// fault aborts it.
    pub fn commit(
        &self,
        draft: &mut ShipmentDraft,
        counterparty: Option<CounterpartyId>,
        now: DateTime<Utc>,
    ) -> Result<Deal, CommitError> {
        let span = tracing::info_span!("commit", operator = %draft.operator(), draft_id = %draft.id());
        let _entered = span.enter();

        if draft.ensure_committable().is_err() {
            return Err(CommitError::InvalidDraftState {
                state: draft.state(),
            });
        }

        let counterparty_id = counterparty
            .or(draft.counterparty())
            .ok_or(CommitError::MissingCounterparty)?;
        let counterparty = self
            .directory
            .get(counterparty_id)
            .map_err(CommitError::Directory)?
            .ok_or(CommitError::UnknownCounterparty(counterparty_id))?;
        if !counterparty.can_transact() {
            return Err(CommitError::CounterpartyArchived(counterparty_id));
        }

        let held = self.reserve_all(draft)?;

        let mut pending = PendingDeal::new(
            draft.id(),
            counterparty_id,
            counterparty.name(),
            draft.operator().clone(),
            now,
        );
        let mut consumed = Vec::with_capacity(held.len());
        let mut remaining = held.into_iter();

        while let Some((idx, token)) = remaining.next() {
            let line = &draft.lines()[idx];
            let attribution = match self.ledger.consume(&token, now) {
                Ok(attribution) => attribution,
                Err(err) => {
                    // Nothing was recorded for this token; it is still a hold.
                    let unconsumed: Vec<ReservationToken> = std::iter::once(token)
                        .chain(remaining.map(|(_, t)| t))
                        .collect();
                    return Err(self.fault(draft, pending, consumed, &unconsumed, err.to_string(), now));
                }
            };
            consumed.push(ConsumedLine {
                item_id: token.item_id(),
                quantity: attribution.quantity,
                unit_cost: attribution.unit_cost,
            });

            match deal_line(line, attribution.unit_cost) {
                Ok(deal_line) => pending.lines.push(deal_line),
                Err(err) => {
                    let unconsumed: Vec<ReservationToken> = remaining.map(|(_, t)| t).collect();
                    return Err(self.fault(draft, pending, consumed, &unconsumed, err.to_string(), now));
                }
            }
        }

        let deal = match self.deals.append(pending.clone()) {
            Ok(deal) => deal,
            Err(err) => return Err(self.fault(draft, pending, consumed, &[], err.to_string(), now)),
        };

        if let Err(err) = draft.mark_committed(now) {
            tracing::error!(deal_id = %deal.id(), error = %err, "deal recorded but draft could not be closed");
        }

        let envelope = EventEnvelope::wrap(
            deal.id().0,
            DealRecorded::AGGREGATE_TYPE,
            deal.doc_number(),
            DealRecorded {
                deal: deal.clone(),
                occurred_at: now,
            },
        );
        if let Err(err) = self.bus.publish(envelope) {
            tracing::error!(deal_id = %deal.id(), error = ?err, "deal recorded but not published");
        }

        tracing::info!(
            deal_id = %deal.id(),
            doc_number = deal.doc_number(),
            counterparty = deal.counterparty_name(),
            lines = deal.lines().len(),
            revenue = %deal.total_revenue(),
            profit = %deal.total_profit(),
            "shipment committed"
        );
        Ok(deal)
    }

    /// Reserve every line in ascending item order. On refusal, release what was
    /// taken and report the refusing item.
    fn reserve_all(&self, draft: &ShipmentDraft) -> Result<Vec<(usize, ReservationToken)>, CommitError> {
        let order = draft.reservation_order();
        let mut held: Vec<(usize, ReservationToken)> = Vec::with_capacity(order.len());

        for idx in order {
            let line = &draft.lines()[idx];
            match self.ledger.reserve(line.item_id, line.quantity) {
                Ok(token) => held.push((idx, token)),
                Err(err) => {
                    let tokens: Vec<ReservationToken> = held.into_iter().map(|(_, t)| t).collect();
                    self.release_all(&tokens);

                    let err = CommitError::from(err);
                    if err.is_fault() {
                        tracing::error!(item_id = %line.item_id, error = %err, "reservation failed");
                    } else {
                        tracing::warn!(item_id = %line.item_id, qty = line.quantity, error = %err, "commit refused");
                    }
                    return Err(err);
                }
            }
        }
        Ok(held)
    }

    fn release_all(&self, tokens: &[ReservationToken]) -> Vec<ReleasedLine> {
        tokens
            .iter()
            .filter_map(|token| match self.ledger.release(token) {
                Ok(()) => Some(ReleasedLine {
                    item_id: token.item_id(),
                    quantity: token.quantity(),
                }),
                Err(err) => {
                    tracing::error!(
                        item_id = %token.item_id(),
                        reservation = %token.id(),
                        error = %err,
                        "reservation could not be released"
                    );
                    None
                }
            })
            .collect()
    }

    fn fault(
        &self,
        draft: &mut ShipmentDraft,
        deal: PendingDeal,
        consumed: Vec<ConsumedLine>,
        unconsumed: &[ReservationToken],
        cause: String,
        now: DateTime<Utc>,
    ) -> CommitError {
        let released = self.release_all(unconsumed);
        let _ = draft.abort(now);

        let fault = PartialCommitFault {
            draft_id: draft.id(),
            operator: draft.operator().clone(),
            consumed,
            released,
            deal,
            cause,
        };
        tracing::error!(
            draft_id = %fault.draft_id,
            consumed = ?fault.consumed,
            released = ?fault.released,
            cause = %fault.cause,
            "partial commit fault; manual reconciliation required"
        );
        CommitError::PartialCommitFault(Box::new(fault))
    }
}
