//! Deals: immutable records of committed shipments.
//!
//! Unit costs are fixed when the deal is built and never recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{AggregateId, DomainError, Money, OperatorId};
use depot_events::Event;
use depot_inventory::ItemId;
use depot_parties::CounterpartyId;

use crate::draft::DraftId;

/// Deal identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub AggregateId);

impl DealId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DealId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub item_code: u32,
    pub item_name: String,
    pub quantity: u64,
    pub unit_price: Money,
    /// Acquisition cost charged per unit at commit time.
    pub unit_cost: Money,
    /// `quantity × (unit_price − unit_cost)`; negative for a loss-making line.
    pub profit: Money,
}

impl DealLine {
    pub fn new(
        line_no: u32,
        item_id: ItemId,
        item_code: u32,
        item_name: impl Into<String>,
        quantity: u64,
        unit_price: Money,
        unit_cost: Money,
    ) -> Result<Self, DomainError> {
        let margin = unit_price
            .checked_sub(unit_cost)
            .ok_or_else(|| DomainError::validation("unit margin overflows"))?;
        let profit = margin
            .checked_mul_qty(quantity)
            .ok_or_else(|| DomainError::validation("line profit overflows"))?;

        Ok(Self {
            line_no,
            item_id,
            item_code,
            item_name: item_name.into(),
            quantity,
            unit_price,
            unit_cost,
            profit,
        })
    }

    /// `quantity × unit_price`, saturating like all [`Money`] totals.
    pub fn revenue(&self) -> Money {
        self.unit_price.saturating_mul_qty(self.quantity)
    }

    pub fn cost(&self) -> Money {
        self.unit_cost.saturating_mul_qty(self.quantity)
    }
}

/// A deal under construction by the commit coordinator; not yet numbered or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeal {
    pub id: DealId,
    pub draft_id: DraftId,
    pub counterparty_id: CounterpartyId,
    pub counterparty_name: String,
    pub operator: OperatorId,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<DealLine>,
}

impl PendingDeal {
    pub fn new(
        draft_id: DraftId,
        counterparty_id: CounterpartyId,
        counterparty_name: impl Into<String>,
        operator: OperatorId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DealId::new(AggregateId::new()),
            draft_id,
            counterparty_id,
            counterparty_name: counterparty_name.into(),
            operator,
            created_at,
            lines: Vec::new(),
        }
    }

    /// Seal the deal under its document number. Lines are ordered by line number.
    pub fn numbered(mut self, doc_number: u64) -> Result<Deal, DomainError> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("a deal needs at least one line"));
        }
        if doc_number == 0 {
            return Err(DomainError::validation("document numbers start at 1"));
        }
        self.lines.sort_by_key(|l| l.line_no);

        Ok(Deal {
            id: self.id,
            doc_number,
            draft_id: self.draft_id,
            counterparty_id: self.counterparty_id,
            counterparty_name: self.counterparty_name,
            operator: self.operator,
            created_at: self.created_at,
            lines: self.lines,
        })
    }
}

/// Finalized deal. Immutable: fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    id: DealId,
    doc_number: u64,
    draft_id: DraftId,
    counterparty_id: CounterpartyId,
    counterparty_name: String,
    operator: OperatorId,
    created_at: DateTime<Utc>,
    lines: Vec<DealLine>,
}

impl Deal {
    pub fn id(&self) -> DealId {
        self.id
    }

    pub fn doc_number(&self) -> u64 {
        self.doc_number
    }

    pub fn draft_id(&self) -> DraftId {
        self.draft_id
    }

    pub fn counterparty_id(&self) -> CounterpartyId {
        self.counterparty_id
    }

    pub fn counterparty_name(&self) -> &str {
        &self.counterparty_name
    }

    pub fn operator(&self) -> &OperatorId {
        &self.operator
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lines(&self) -> &[DealLine] {
        &self.lines
    }

    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn total_revenue(&self) -> Money {
        self.lines.iter().map(DealLine::revenue).sum()
    }

    pub fn total_cost(&self) -> Money {
        self.lines.iter().map(DealLine::cost).sum()
    }

    pub fn total_profit(&self) -> Money {
        self.lines.iter().map(|l| l.profit).sum()
    }
}

/// Event: DealRecorded. The hand-off to document generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecorded {
    pub deal: Deal,
    pub occurred_at: DateTime<Utc>,
}

impl DealRecorded {
    pub const AGGREGATE_TYPE: &'static str = "shipping.deal";
}

impl Event for DealRecorded {
    fn event_type(&self) -> &'static str {
        "shipping.deal.recorded"
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
