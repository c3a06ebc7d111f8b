//! Shipment draft: the mutable, per-operator shipment being assembled.
//!
//! Lifecycle: `Empty → Building → PendingConfirmation → Committed | Aborted`.
//! Lines are validated locally only; stock is not looked at until commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{AggregateId, DomainError, Money, OperatorId};
use depot_inventory::ItemId;
use depot_parties::CounterpartyId;

use crate::error::DraftError;

/// Draft identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub AggregateId);

impl DraftId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DraftId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftState {
    Empty,
    Building,
    PendingConfirmation,
    Committed,
    Aborted,
}

impl DraftState {
    pub fn as_str(self) -> &'static str {
        match self {
            DraftState::Empty => "empty",
            DraftState::Building => "building",
            DraftState::PendingConfirmation => "pending_confirmation",
            DraftState::Committed => "committed",
            DraftState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DraftState::Committed | DraftState::Aborted)
    }
}

impl core::fmt::Display for DraftState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line input. Item identity is snapshot here so admin edits made while the
/// draft is open do not change what the operator reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub item_id: ItemId,
    pub item_code: u32,
    pub item_name: String,
    pub quantity: u64,
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub item_code: u32,
    pub item_name: String,
    pub quantity: u64,
    /// Sale price per unit, minor currency units.
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDraft {
    id: DraftId,
    operator: OperatorId,
    counterparty: Option<CounterpartyId>,
    state: DraftState,
    lines: Vec<DraftLine>,
    next_line_no: u32,
    started_at: DateTime<Utc>,
    touched_at: DateTime<Utc>,
}

fn validate_line(quantity: u64, unit_price: Money) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if unit_price.is_negative() {
        return Err(DomainError::validation("unit_price cannot be negative"));
    }
    Ok(())
}

impl ShipmentDraft {
    pub fn new(operator: OperatorId, now: DateTime<Utc>) -> Self {
        Self {
            id: DraftId::new(AggregateId::new()),
            operator,
            counterparty: None,
            state: DraftState::Empty,
            lines: Vec::new(),
            next_line_no: 1,
            started_at: now,
            touched_at: now,
        }
    }

    pub fn id(&self) -> DraftId {
        self.id
    }

    pub fn operator(&self) -> &OperatorId {
        &self.operator
    }

    pub fn counterparty(&self) -> Option<CounterpartyId> {
        self.counterparty
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&DraftLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time of the last accepted action; drives idle expiry.
    pub fn touched_at(&self) -> DateTime<Utc> {
        self.touched_at
    }

    /// Sum of `quantity × unit_price` over all lines.
    pub fn total_price(&self) -> Money {
        self.lines
            .iter()
            .map(|l| l.unit_price.saturating_mul_qty(l.quantity))
            .sum()
    }

    /// Indices into `lines()` in reservation order: ascending item id, entry order
    /// as tie-break.
    pub fn reservation_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.lines.len()).collect();
        order.sort_by_key(|&i| (self.lines[i].item_id, self.lines[i].line_no));
        order
    }

    /// Choose (or change) the counterparty. Lines are untouched, so this is
    /// allowed while the draft awaits confirmation.
    pub fn set_counterparty(
        &mut self,
        counterparty: CounterpartyId,
        now: DateTime<Utc>,
    ) -> Result<(), DraftError> {
        self.ensure_open("choose a counterparty")?;
        self.counterparty = Some(counterparty);
        self.touched_at = now;
        Ok(())
    }

    /// Append a line; returns its line number. Editing a draft under review sends it
    /// back to `Building`.
    pub fn add_line(&mut self, line: NewLine, now: DateTime<Utc>) -> Result<u32, DraftError> {
        self.ensure_open("add a line")?;
        validate_line(line.quantity, line.unit_price)?;

        let line_no = self.next_line_no;
        self.next_line_no += 1;
        self.lines.push(DraftLine {
            line_no,
            item_id: line.item_id,
            item_code: line.item_code,
            item_name: line.item_name,
            quantity: line.quantity,
            unit_price: line.unit_price,
        });
        self.state = DraftState::Building;
        self.touched_at = now;
        Ok(line_no)
    }

    /// Change quantity and/or price of an existing line.
    pub fn update_line(
        &mut self,
        line_no: u32,
        quantity: Option<u64>,
        unit_price: Option<Money>,
        now: DateTime<Utc>,
    ) -> Result<(), DraftError> {
        self.ensure_open("update a line")?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.line_no == line_no)
            .ok_or(DraftError::LineNotFound { line_no })?;

        let quantity = quantity.unwrap_or(line.quantity);
        let unit_price = unit_price.unwrap_or(line.unit_price);
        validate_line(quantity, unit_price)?;

        line.quantity = quantity;
        line.unit_price = unit_price;
        self.state = DraftState::Building;
        self.touched_at = now;
        Ok(())
    }

    /// Remove a line; removing the last one returns the draft to `Empty`.
    pub fn remove_line(&mut self, line_no: u32, now: DateTime<Utc>) -> Result<DraftLine, DraftError> {
        self.ensure_open("remove a line")?;
        let idx = self
            .lines
            .iter()
            .position(|l| l.line_no == line_no)
            .ok_or(DraftError::LineNotFound { line_no })?;

        let removed = self.lines.remove(idx);
        self.state = if self.lines.is_empty() {
            DraftState::Empty
        } else {
            DraftState::Building
        };
        self.touched_at = now;
        Ok(removed)
    }

    /// `Building → PendingConfirmation`: freeze lines for review.
    pub fn request_checkout(&mut self, now: DateTime<Utc>) -> Result<(), DraftError> {
        if self.state != DraftState::Building {
            return Err(DraftError::InvalidState {
                state: self.state,
                action: "request checkout",
            });
        }
        self.state = DraftState::PendingConfirmation;
        self.touched_at = now;
        Ok(())
    }

    /// `PendingConfirmation → Building`: reopen lines for editing.
    pub fn edit(&mut self, now: DateTime<Utc>) -> Result<(), DraftError> {
        if self.state != DraftState::PendingConfirmation {
            return Err(DraftError::InvalidState {
                state: self.state,
                action: "reopen for editing",
            });
        }
        self.state = DraftState::Building;
        self.touched_at = now;
        Ok(())
    }

    /// Gate for the commit coordinator.
    pub fn ensure_committable(&self) -> Result<(), DraftError> {
        if self.state != DraftState::PendingConfirmation || self.lines.is_empty() {
            return Err(DraftError::InvalidState {
                state: self.state,
                action: "commit",
            });
        }
        Ok(())
    }

    pub fn mark_committed(&mut self, now: DateTime<Utc>) -> Result<(), DraftError> {
        self.ensure_committable()?;
        self.state = DraftState::Committed;
        self.touched_at = now;
        Ok(())
    }

    /// Discard the draft. Idempotent once aborted; a committed draft stays committed.
    pub fn abort(&mut self, now: DateTime<Utc>) -> Result<(), DraftError> {
        match self.state {
            DraftState::Aborted => Ok(()),
            DraftState::Committed => Err(DraftError::InvalidState {
                state: self.state,
                action: "abort",
            }),
            _ => {
                self.state = DraftState::Aborted;
                self.touched_at = now;
                Ok(())
            }
        }
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), DraftError> {
        if self.state.is_terminal() {
            return Err(DraftError::InvalidState {
                state: self.state,
                action,
            });
        }
        Ok(())
    }
}
