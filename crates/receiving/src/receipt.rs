use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use depot_events::Event;
use depot_inventory::ItemId;
use depot_parties::CounterpartyId;

/// Goods receipt identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub AggregateId);

impl ReceiptId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Draft,
    Posted,
}

/// Receipt line: what arrived and what it cost per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: u64,
    pub unit_cost: Money,
}

impl ReceiptLine {
    pub fn total_cost(&self) -> Money {
        self.unit_cost.saturating_mul_qty(self.quantity)
    }
}

/// Aggregate root: GoodsReceipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodsReceipt {
    id: ReceiptId,
    supplier_id: Option<CounterpartyId>,
    status: ReceiptStatus,
    doc_number: Option<u64>,
    posted_at: Option<DateTime<Utc>>,
    lines: Vec<ReceiptLine>,
    version: u64,
    created: bool,
}

impl GoodsReceipt {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ReceiptId) -> Self {
        Self {
            id,
            supplier_id: None,
            status: ReceiptStatus::Draft,
            doc_number: None,
            posted_at: None,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReceiptId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn supplier_id(&self) -> Option<CounterpartyId> {
        self.supplier_id
    }

    pub fn status(&self) -> ReceiptStatus {
        self.status
    }

    /// Assigned when the receipt is posted.
    pub fn doc_number(&self) -> Option<u64> {
        self.doc_number
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }

    pub fn lines(&self) -> &[ReceiptLine] {
        &self.lines
    }

    pub fn total_cost(&self) -> Money {
        self.lines.iter().map(ReceiptLine::total_cost).sum()
    }
}

impl AggregateRoot for GoodsReceipt {
    type Id = ReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReceipt {
    pub receipt_id: ReceiptId,
    pub supplier_id: CounterpartyId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddReceiptLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReceiptLine {
    pub receipt_id: ReceiptId,
    pub item_id: ItemId,
    pub quantity: u64,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostReceipt. The document number comes from the receipt journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub receipt_id: ReceiptId,
    pub doc_number: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptCommand {
    OpenReceipt(OpenReceipt),
    AddReceiptLine(AddReceiptLine),
    PostReceipt(PostReceipt),
}

/// Event: ReceiptOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptOpened {
    pub receipt_id: ReceiptId,
    pub supplier_id: CounterpartyId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLineAdded {
    pub receipt_id: ReceiptId,
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: u64,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPosted {
    pub receipt_id: ReceiptId,
    pub doc_number: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptEvent {
    ReceiptOpened(ReceiptOpened),
    ReceiptLineAdded(ReceiptLineAdded),
    ReceiptPosted(ReceiptPosted),
}

impl Event for ReceiptEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReceiptEvent::ReceiptOpened(_) => "receiving.receipt.opened",
            ReceiptEvent::ReceiptLineAdded(_) => "receiving.receipt.line_added",
            ReceiptEvent::ReceiptPosted(_) => "receiving.receipt.posted",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReceiptEvent::ReceiptOpened(e) => e.occurred_at,
            ReceiptEvent::ReceiptLineAdded(e) => e.occurred_at,
            ReceiptEvent::ReceiptPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for GoodsReceipt {
    type Command = ReceiptCommand;
    type Event = ReceiptEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReceiptEvent::ReceiptOpened(e) => {
                self.id = e.receipt_id;
                self.supplier_id = Some(e.supplier_id);
                self.status = ReceiptStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            ReceiptEvent::ReceiptLineAdded(e) => {
                self.lines.push(ReceiptLine {
                    line_no: e.line_no,
                    item_id: e.item_id,
                    quantity: e.quantity,
                    unit_cost: e.unit_cost,
                });
            }
            ReceiptEvent::ReceiptPosted(e) => {
                self.status = ReceiptStatus::Posted;
                self.doc_number = Some(e.doc_number);
                self.posted_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReceiptCommand::OpenReceipt(cmd) => self.handle_open(cmd),
            ReceiptCommand::AddReceiptLine(cmd) => self.handle_add_line(cmd),
            ReceiptCommand::PostReceipt(cmd) => self.handle_post(cmd),
        }
    }
}

/// Rules every receipt line obeys, checkable before a receipt is opened.
pub fn validate_line(quantity: u64, unit_cost: Money) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if unit_cost.is_negative() {
        return Err(DomainError::validation("unit_cost cannot be negative"));
    }
    Ok(())
}

impl GoodsReceipt {
    fn ensure_draft(&self, receipt_id: ReceiptId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("receipt"));
        }
        if self.id != receipt_id {
            return Err(DomainError::invariant("receipt_id mismatch"));
        }
        if self.status != ReceiptStatus::Draft {
            return Err(DomainError::invariant("receipt is already posted"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenReceipt) -> Result<Vec<ReceiptEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("receipt already exists"));
        }

        Ok(vec![ReceiptEvent::ReceiptOpened(ReceiptOpened {
            receipt_id: cmd.receipt_id,
            supplier_id: cmd.supplier_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddReceiptLine) -> Result<Vec<ReceiptEvent>, DomainError> {
        self.ensure_draft(cmd.receipt_id)?;
        validate_line(cmd.quantity, cmd.unit_cost)?;

        Ok(vec![ReceiptEvent::ReceiptLineAdded(ReceiptLineAdded {
            receipt_id: cmd.receipt_id,
            line_no: (self.lines.len() as u32) + 1,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostReceipt) -> Result<Vec<ReceiptEvent>, DomainError> {
        self.ensure_draft(cmd.receipt_id)?;

        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot post a receipt without lines"));
        }
        if cmd.doc_number == 0 {
            return Err(DomainError::validation("document numbers start at 1"));
        }

        Ok(vec![ReceiptEvent::ReceiptPosted(ReceiptPosted {
            receipt_id: cmd.receipt_id,
            doc_number: cmd.doc_number,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_receipt_id() -> ReceiptId {
        ReceiptId::new(AggregateId::new())
    }

    fn test_supplier_id() -> CounterpartyId {
        CounterpartyId::new(AggregateId::new())
    }

    fn test_item_id() -> ItemId {
        ItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn run(receipt: &mut GoodsReceipt, cmd: ReceiptCommand) -> Result<(), DomainError> {
        for e in receipt.handle(&cmd)? {
            receipt.apply(&e);
        }
        Ok(())
    }

    fn opened() -> GoodsReceipt {
        let id = test_receipt_id();
        let mut receipt = GoodsReceipt::empty(id);
        run(
            &mut receipt,
            ReceiptCommand::OpenReceipt(OpenReceipt {
                receipt_id: id,
                supplier_id: test_supplier_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        receipt
    }

    fn add_line(receipt: &mut GoodsReceipt, quantity: u64, cost: i64) -> Result<(), DomainError> {
        let receipt_id = receipt.id_typed();
        run(
            receipt,
            ReceiptCommand::AddReceiptLine(AddReceiptLine {
                receipt_id,
                item_id: test_item_id(),
                quantity,
                unit_cost: Money::from_minor(cost),
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn lines_are_numbered_and_totalled() {
        let mut receipt = opened();
        add_line(&mut receipt, 5, 200).unwrap();
        add_line(&mut receipt, 5, 400).unwrap();

        assert_eq!(receipt.lines()[1].line_no, 2);
        assert_eq!(receipt.total_cost(), Money::from_minor(3000));
        assert_eq!(receipt.version(), 3);
    }

    #[test]
    fn oversized_totals_saturate() {
        let mut receipt = opened();
        add_line(&mut receipt, 3, i64::MAX / 2).unwrap();
        add_line(&mut receipt, 1, 100).unwrap();

        assert_eq!(receipt.lines()[0].total_cost(), Money::MAX);
        assert_eq!(receipt.total_cost(), Money::MAX);
    }

    #[test]
    fn invalid_lines_are_rejected() {
        let mut receipt = opened();
        assert!(matches!(
            add_line(&mut receipt, 0, 100),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            add_line(&mut receipt, 1, -5),
            Err(DomainError::Validation(_))
        ));
        assert!(receipt.lines().is_empty());
    }

    #[test]
    fn empty_receipt_cannot_be_posted() {
        let receipt = opened();
        let err = receipt
            .handle(&ReceiptCommand::PostReceipt(PostReceipt {
                receipt_id: receipt.id_typed(),
                doc_number: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn posted_receipt_is_frozen() {
        let mut receipt = opened();
        add_line(&mut receipt, 2, 100).unwrap();
        let receipt_id = receipt.id_typed();
        run(
            &mut receipt,
            ReceiptCommand::PostReceipt(PostReceipt {
                receipt_id,
                doc_number: 4,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(receipt.status(), ReceiptStatus::Posted);
        assert_eq!(receipt.doc_number(), Some(4));
        assert!(receipt.posted_at().is_some());
        assert!(matches!(
            add_line(&mut receipt, 1, 1),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
