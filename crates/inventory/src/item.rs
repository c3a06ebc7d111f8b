use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use depot_events::Event;

use crate::costing::{AcquisitionLot, CostAttribution, CostBasis, CostPolicy};
use crate::error::InventoryError;
use crate::reservation::ReservationId;

/// Inventory item identifier. Ordered: multi-item commits visit items ascending.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub AggregateId);

impl ItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Admin-editable metadata. Editing it never touches lots or recorded deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    /// Catalogue code printed on shipment documents.
    pub code: u32,
    pub name: String,
    /// Default sale price offered when no earlier price exists for a counterparty.
    pub retail_price: Money,
}

/// Aggregate root: Item (quantity-on-hand plus its cost basis).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    details: ItemDetails,
    on_hand: u64,
    cost_basis: CostBasis,
    lots_received: u32,
    version: u64,
    created: bool,
}

impl Item {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            details: ItemDetails {
                code: 0,
                name: String::new(),
                retail_price: Money::ZERO,
            },
            on_hand: 0,
            cost_basis: CostBasis::new(CostPolicy::default()),
            lots_received: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn on_hand(&self) -> u64 {
        self.on_hand
    }

    pub fn cost_basis(&self) -> &CostBasis {
        &self.cost_basis
    }

    pub fn policy(&self) -> CostPolicy {
        self.cost_basis.policy()
    }

    pub fn lots(&self) -> &[AcquisitionLot] {
        self.cost_basis.lots()
    }

    /// Quantity-on-hand must always match what the cost basis funds.
    pub fn check_invariants(&self) -> Result<(), InventoryError> {
        let funded = self.cost_basis.quantity();
        if funded != self.on_hand {
            return Err(DomainError::invariant(format!(
                "item {}: on-hand {} differs from cost basis quantity {}",
                self.id, self.on_hand, funded
            ))
            .into());
        }
        Ok(())
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub policy: CostPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItemDetails (admin edit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemDetails {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (restock at a unit acquisition cost).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub item_id: ItemId,
    pub quantity: u64,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeStock (permanent decrement backing a reservation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeStock {
    pub item_id: ItemId,
    pub reservation: ReservationId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    UpdateItemDetails(UpdateItemDetails),
    ReceiveStock(ReceiveStock),
    ConsumeStock(ConsumeStock),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub policy: CostPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetailsUpdated {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived (a new acquisition lot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub item_id: ItemId,
    pub lot_seq: u32,
    pub quantity: u64,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockConsumed. Carries the attribution so replay is deterministic and
/// the charged unit cost is fixed forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockConsumed {
    pub item_id: ItemId,
    pub reservation: ReservationId,
    pub attribution: CostAttribution,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    ItemDetailsUpdated(ItemDetailsUpdated),
    StockReceived(StockReceived),
    StockConsumed(StockConsumed),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::ItemDetailsUpdated(_) => "inventory.item.details_updated",
            InventoryEvent::StockReceived(_) => "inventory.item.stock_received",
            InventoryEvent::StockConsumed(_) => "inventory.item.stock_consumed",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::ItemDetailsUpdated(e) => e.occurred_at,
            InventoryEvent::StockReceived(e) => e.occurred_at,
            InventoryEvent::StockConsumed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Item {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = InventoryError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.details = e.details.clone();
                self.on_hand = 0;
                self.cost_basis = CostBasis::new(e.policy);
                self.lots_received = 0;
                self.created = true;
            }
            InventoryEvent::ItemDetailsUpdated(e) => {
                self.details = e.details.clone();
            }
            InventoryEvent::StockReceived(e) => {
                // `handle_receive` only emits lots the basis can fold. A stream that
                // still carries one leaves on-hand ahead of the basis, which
                // `check_invariants` reports.
                let _ = self
                    .cost_basis
                    .restock(e.lot_seq, e.quantity, e.unit_cost, e.occurred_at);
                self.lots_received = self.lots_received.max(e.lot_seq);
                self.on_hand = self.on_hand.saturating_add(e.quantity);
            }
            InventoryEvent::StockConsumed(e) => {
                self.cost_basis.apply_consumption(&e.attribution);
                self.on_hand = self.on_hand.saturating_sub(e.attribution.quantity);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::UpdateItemDetails(cmd) => self.handle_update(cmd),
            InventoryCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            InventoryCommand::ConsumeStock(cmd) => self.handle_consume(cmd),
        }
    }
}

fn validate_details(details: &ItemDetails) -> Result<(), DomainError> {
    if details.name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if details.retail_price.is_negative() {
        return Err(DomainError::validation("retail_price cannot be negative"));
    }
    Ok(())
}

impl Item {
    fn ensure_item_id(&self, item_id: ItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, item_id: ItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("item"));
        }
        self.ensure_item_id(item_id)
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, InventoryError> {
        if self.created {
            return Err(DomainError::conflict("item already exists").into());
        }
        validate_details(&cmd.details)?;

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            item_id: cmd.item_id,
            details: cmd.details.clone(),
            policy: cmd.policy,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateItemDetails) -> Result<Vec<InventoryEvent>, InventoryError> {
        self.ensure_created(cmd.item_id)?;
        validate_details(&cmd.details)?;

        Ok(vec![InventoryEvent::ItemDetailsUpdated(ItemDetailsUpdated {
            item_id: cmd.item_id,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<InventoryEvent>, InventoryError> {
        self.ensure_created(cmd.item_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive").into());
        }
        if cmd.unit_cost.is_negative() {
            return Err(DomainError::validation("unit_cost cannot be negative").into());
        }
        if self.on_hand.checked_add(cmd.quantity).is_none() {
            return Err(DomainError::validation("quantity overflows stock counter").into());
        }
        let lot_seq = self.lots_received + 1;
        self.cost_basis.check_restock(cmd.quantity, cmd.unit_cost)?;

        Ok(vec![InventoryEvent::StockReceived(StockReceived {
            item_id: cmd.item_id,
            lot_seq,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeStock) -> Result<Vec<InventoryEvent>, InventoryError> {
        self.ensure_created(cmd.item_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive").into());
        }
        if cmd.quantity > self.on_hand {
            return Err(DomainError::invariant(format!(
                "consuming {} would drive on-hand {} negative",
                cmd.quantity, self.on_hand
            ))
            .into());
        }

        let attribution =
            self.cost_basis
                .attribute(cmd.quantity)
                .ok_or(InventoryError::CostBasisExhausted {
                    item_id: self.id,
                    requested: cmd.quantity,
                    remaining: self.cost_basis.quantity(),
                })?;

        Ok(vec![InventoryEvent::StockConsumed(StockConsumed {
            item_id: cmd.item_id,
            reservation: cmd.reservation,
            attribution,
            occurred_at: cmd.occurred_at,
        })])
    }
}
