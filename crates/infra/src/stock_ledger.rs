//! Stock ledger: the single shared mutable resource.
//!
//! Every item lives in its own `Mutex` cell holding the rehydrated aggregate and its
//! reservation book. reserve/release/consume/restock on one item are serialized by
//! that mutex; different items never contend. A mutation is appended to the event
//! store first and applied to the cached aggregate only after the append succeeds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, Money};
use depot_inventory::{
    AcquisitionLot, ConsumeStock, CostAttribution, CostPolicy, CreateItem, InventoryCommand,
    InventoryError, InventoryEvent, Item, ItemDetails, ItemId, ReceiveStock, ReservationBook,
    ReservationToken, UpdateItemDetails,
};

use crate::command_dispatcher::{DispatchError, rehydrate};
use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};

pub const ITEM_AGGREGATE_TYPE: &str = "inventory.item";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("item stream could not be replayed: {0}")]
    Replay(#[from] DispatchError),

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("item code {0} is taken")]
    DuplicateCode(u32),

    #[error("item {item_id} uses {found} costing but the ledger runs {configured}")]
    PolicyMismatch {
        item_id: ItemId,
        found: CostPolicy,
        configured: CostPolicy,
    },

    #[error("stock ledger lock poisoned")]
    Poisoned,
}

impl LedgerError {
    /// Whether the ledger itself is in doubt, as opposed to the request being wrong.
    pub fn is_fault(&self) -> bool {
        match self {
            LedgerError::Inventory(e) => e.is_fault(),
            LedgerError::UnknownItem(_) | LedgerError::DuplicateCode(_) => false,
            LedgerError::Store(_)
            | LedgerError::Replay(_)
            | LedgerError::PolicyMismatch { .. }
            | LedgerError::Poisoned => true,
        }
    }
}

/// Point-in-time view of one item, for reports and the operator surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    pub code: u32,
    pub name: String,
    pub retail_price: Money,
    pub policy: CostPolicy,
    pub on_hand: u64,
    pub reserved: u64,
    pub available: u64,
    /// Cost the next sold unit would be charged; `None` when nothing is funded.
    pub unit_cost: Option<Money>,
    /// Saturates at [`Money::MAX`] should the basis ever hold more than fits.
    pub valuation: Money,
    pub lots: Vec<AcquisitionLot>,
    pub version: u64,
}

#[derive(Debug)]
struct ItemCell {
    item: Item,
    book: ReservationBook,
}

impl ItemCell {
    fn new(item: Item) -> Self {
        let book = ReservationBook::new(item.id_typed());
        Self { item, book }
    }

    fn snapshot(&self) -> ItemSnapshot {
        let details = self.item.details();
        let basis = self.item.cost_basis();
        ItemSnapshot {
            item_id: self.item.id_typed(),
            code: details.code,
            name: details.name.clone(),
            retail_price: details.retail_price,
            policy: self.item.policy(),
            on_hand: self.item.on_hand(),
            reserved: self.book.outstanding(),
            available: self.book.available(self.item.on_hand()),
            unit_cost: basis.next_unit_cost(),
            valuation: basis.valuation().unwrap_or(Money::MAX),
            lots: basis.lots().to_vec(),
            version: self.item.version(),
        }
    }
}

pub struct StockLedger<S> {
    store: S,
    policy: CostPolicy,
    cells: RwLock<HashMap<ItemId, Arc<Mutex<ItemCell>>>>,
}

impl<S> core::fmt::Debug for StockLedger<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockLedger")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<S: EventStore> StockLedger<S> {
    /// Ledger over a store that holds no item streams yet.
    pub fn new(store: S, policy: CostPolicy) -> Self {
        Self {
            store,
            policy,
            cells: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild every item from its stream. Items recorded under another costing
    /// policy are refused: the policy is fixed per deployment.
    pub fn open(store: S, policy: CostPolicy) -> Result<Self, LedgerError> {
        let mut cells = HashMap::new();
        for aggregate_id in store.stream_ids(ITEM_AGGREGATE_TYPE)? {
            let stream = store.load_stream(aggregate_id)?;
            let item: Item = rehydrate(&stream, aggregate_id, |id| Item::empty(ItemId::new(id)))?;
            if item.policy() != policy {
                return Err(LedgerError::PolicyMismatch {
                    item_id: item.id_typed(),
                    found: item.policy(),
                    configured: policy,
                });
            }
            item.check_invariants()?;
            cells.insert(item.id_typed(), Arc::new(Mutex::new(ItemCell::new(item))));
        }

        tracing::info!(items = cells.len(), policy = %policy, "stock ledger opened");
        Ok(Self {
            store,
            policy,
            cells: RwLock::new(cells),
        })
    }

    pub fn policy(&self) -> CostPolicy {
        self.policy
    }

    pub fn contains(&self, item_id: ItemId) -> Result<bool, LedgerError> {
        let cells = self.cells.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(cells.contains_key(&item_id))
    }

    /// Create an item under a catalogue code no other item carries.
    pub fn create_item(&self, details: ItemDetails, now: DateTime<Utc>) -> Result<ItemId, LedgerError> {
        // The write lock spans check and insert so two creations cannot share a code.
        let mut cells = self.cells.write().map_err(|_| LedgerError::Poisoned)?;
        ensure_code_free(&cells, details.code, None)?;

        let item_id = ItemId::new(AggregateId::new());
        let mut cell = ItemCell::new(Item::empty(item_id));
        self.execute(
            &mut cell,
            InventoryCommand::CreateItem(CreateItem {
                item_id,
                details,
                policy: self.policy,
                occurred_at: now,
            }),
        )?;

        cells.insert(item_id, Arc::new(Mutex::new(cell)));
        tracing::info!(%item_id, "item created");
        Ok(item_id)
    }

    /// Admin edit of identity/metadata. Lots and recorded deals are untouched.
    pub fn update_item_details(
        &self,
        item_id: ItemId,
        details: ItemDetails,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let cells = self.cells.write().map_err(|_| LedgerError::Poisoned)?;
        let cell = cells
            .get(&item_id)
            .cloned()
            .ok_or(LedgerError::UnknownItem(item_id))?;
        ensure_code_free(&cells, details.code, Some(item_id))?;

        let mut cell = lock(&cell)?;
        self.execute(
            &mut cell,
            InventoryCommand::UpdateItemDetails(UpdateItemDetails {
                item_id,
                details,
                occurred_at: now,
            }),
        )?;
        Ok(())
    }

    /// Receive `quantity` units at `unit_cost`; returns the new lot's sequence number.
    pub fn restock(
        &self,
        item_id: ItemId,
        quantity: u64,
        unit_cost: Money,
        now: DateTime<Utc>,
    ) -> Result<u32, LedgerError> {
        let cell = self.cell(item_id)?;
        let mut cell = lock(&cell)?;
        let events = self.execute(
            &mut cell,
            InventoryCommand::ReceiveStock(ReceiveStock {
                item_id,
                quantity,
                unit_cost,
                occurred_at: now,
            }),
        )?;

        let lot_seq = events
            .iter()
            .find_map(|e| match e {
                InventoryEvent::StockReceived(r) => Some(r.lot_seq),
                _ => None,
            })
            .unwrap_or_default();
        tracing::info!(%item_id, qty = quantity, unit_cost = %unit_cost, lot_seq, "stock received");
        Ok(lot_seq)
    }

    /// Place an advisory hold. Fails immediately with `InsufficientStock` when
    /// on-hand minus outstanding holds cannot cover `quantity`; never waits.
    pub fn reserve(&self, item_id: ItemId, quantity: u64) -> Result<ReservationToken, LedgerError> {
        let cell = self.cell(item_id)?;
        let mut cell = lock(&cell)?;
        let on_hand = cell.item.on_hand();
        let token = cell.book.reserve(on_hand, quantity)?;
        tracing::debug!(%item_id, qty = quantity, reservation = %token.id(), "stock reserved");
        Ok(token)
    }

    pub fn release(&self, token: &ReservationToken) -> Result<(), LedgerError> {
        let cell = self.cell(token.item_id())?;
        let mut cell = lock(&cell)?;
        cell.book.release(token)?;
        cell.book.prune_settled();
        tracing::debug!(item_id = %token.item_id(), reservation = %token.id(), "reservation released");
        Ok(())
    }

    /// Convert a held reservation into a permanent decrement, drawing on the cost
    /// basis in the same critical section. Returns the cost charged.
    pub fn consume(
        &self,
        token: &ReservationToken,
        now: DateTime<Utc>,
    ) -> Result<CostAttribution, LedgerError> {
        let item_id = token.item_id();
        let cell = self.cell(item_id)?;
        let mut cell = lock(&cell)?;
        let quantity = cell.book.held_quantity(token)?;

        let events = self.execute(
            &mut cell,
            InventoryCommand::ConsumeStock(ConsumeStock {
                item_id,
                reservation: token.id(),
                quantity,
                occurred_at: now,
            }),
        )?;
        cell.book.mark_consumed(token)?;
        cell.book.prune_settled();

        let attribution = events
            .into_iter()
            .find_map(|e| match e {
                InventoryEvent::StockConsumed(c) => Some(c.attribution),
                _ => None,
            })
            .ok_or_else(|| {
                InventoryError::from(DomainError::invariant("consumption recorded no attribution"))
            })?;

        tracing::debug!(
            %item_id,
            qty = quantity,
            unit_cost = %attribution.unit_cost,
            on_hand = cell.item.on_hand(),
            "stock consumed"
        );
        Ok(attribution)
    }

    pub fn snapshot(&self, item_id: ItemId) -> Result<ItemSnapshot, LedgerError> {
        let cell = self.cell(item_id)?;
        let cell = lock(&cell)?;
        Ok(cell.snapshot())
    }

    /// Snapshots of every item ordered by catalogue code.
    pub fn list(&self) -> Result<Vec<ItemSnapshot>, LedgerError> {
        let handles: Vec<Arc<Mutex<ItemCell>>> = {
            let cells = self.cells.read().map_err(|_| LedgerError::Poisoned)?;
            cells.values().cloned().collect()
        };

        let mut snapshots = handles
            .iter()
            .map(|cell| lock(cell).map(|c| c.snapshot()))
            .collect::<Result<Vec<_>, _>>()?;
        snapshots.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.name.cmp(&b.name)));
        Ok(snapshots)
    }

    pub fn find_by_code(&self, code: u32) -> Result<Option<ItemSnapshot>, LedgerError> {
        Ok(self.list()?.into_iter().find(|s| s.code == code))
    }

    /// Verify on-hand against the cost basis and outstanding holds for every item.
    pub fn audit(&self) -> Result<(), LedgerError> {
        let handles: Vec<Arc<Mutex<ItemCell>>> = {
            let cells = self.cells.read().map_err(|_| LedgerError::Poisoned)?;
            cells.values().cloned().collect()
        };

        for handle in handles {
            let cell = lock(&handle)?;
            cell.item.check_invariants()?;
            if cell.book.outstanding() > cell.item.on_hand() {
                return Err(InventoryError::from(DomainError::invariant(format!(
                    "item {}: {} held against {} on hand",
                    cell.item.id_typed(),
                    cell.book.outstanding(),
                    cell.item.on_hand()
                )))
                .into());
            }
        }
        Ok(())
    }

    fn cell(&self, item_id: ItemId) -> Result<Arc<Mutex<ItemCell>>, LedgerError> {
        let cells = self.cells.read().map_err(|_| LedgerError::Poisoned)?;
        cells
            .get(&item_id)
            .cloned()
            .ok_or(LedgerError::UnknownItem(item_id))
    }

    /// Decide, persist, then apply. Nothing changes in memory if the append fails.
    fn execute(
        &self,
        cell: &mut ItemCell,
        command: InventoryCommand,
    ) -> Result<Vec<InventoryEvent>, LedgerError> {
        let events = cell.item.handle(&command)?;
        let aggregate_id = cell.item.id_typed().0;
        let uncommitted = events
            .iter()
            .map(|e| UncommittedEvent::from_typed(aggregate_id, ITEM_AGGREGATE_TYPE, e))
            .collect::<Result<Vec<_>, _>>()?;

        self.store
            .append(uncommitted, ExpectedVersion::Exact(cell.item.version()))?;
        cell.item.apply_all(&events);
        Ok(events)
    }
}

fn lock(cell: &Mutex<ItemCell>) -> Result<MutexGuard<'_, ItemCell>, LedgerError> {
    cell.lock().map_err(|_| LedgerError::Poisoned)
}

/// Callers hold the `cells` write lock; item locks are only ever taken after it.
fn ensure_code_free(
    cells: &HashMap<ItemId, Arc<Mutex<ItemCell>>>,
    code: u32,
    except: Option<ItemId>,
) -> Result<(), LedgerError> {
    for (item_id, cell) in cells {
        if Some(*item_id) == except {
            continue;
        }
        if lock(cell)?.item.details().code == code {
            return Err(LedgerError::DuplicateCode(code));
        }
    }
    Ok(())
}
