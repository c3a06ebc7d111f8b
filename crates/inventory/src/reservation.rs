//! Reservations: advisory holds on stock taken while a shipment commits.
//!
//! Each token moves through `Held → Consumed | Released` exactly once. Holds never
//! touch quantity-on-hand; they only shrink what further `reserve` calls may claim.
//! Reservations are never persisted: the book lives next to the cached item inside
//! the stock ledger's per-item critical section.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use depot_core::DomainError;

use crate::error::InventoryError;
use crate::item::ItemId;

/// Book-local reservation number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub u64);

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    Held,
    Consumed,
    Released,
}

/// Proof of a hold on `quantity` units of one item.
///
/// Deliberately not `Clone`: the holder settles it once, by `consume` or `release`.
#[derive(Debug, PartialEq, Eq)]
pub struct ReservationToken {
    id: ReservationId,
    item_id: ItemId,
    quantity: u64,
}

impl ReservationToken {
    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    quantity: u64,
    state: ReservationState,
}

/// Outstanding holds for a single item.
#[derive(Debug, Clone)]
pub struct ReservationBook {
    item_id: ItemId,
    next_id: u64,
    outstanding: u64,
    entries: HashMap<ReservationId, Entry>,
}

impl ReservationBook {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            next_id: 1,
            outstanding: 0,
            entries: HashMap::new(),
        }
    }

    /// Total quantity currently held.
    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    /// Quantity still claimable given `on_hand`.
    pub fn available(&self, on_hand: u64) -> u64 {
        on_hand.saturating_sub(self.outstanding)
    }

    pub fn state(&self, id: ReservationId) -> Option<ReservationState> {
        self.entries.get(&id).map(|e| e.state)
    }

    /// Place a hold, or fail without mutating anything.
    pub fn reserve(&mut self, on_hand: u64, quantity: u64) -> Result<ReservationToken, InventoryError> {
        if quantity == 0 {
            return Err(DomainError::validation("reservation quantity must be positive").into());
        }

        let available = self.available(on_hand);
        if available < quantity {
            return Err(InventoryError::InsufficientStock {
                item_id: self.item_id,
                requested: quantity,
                available,
            });
        }

        let id = ReservationId(self.next_id);
        self.next_id += 1;
        self.outstanding += quantity;
        self.entries.insert(
            id,
            Entry {
                quantity,
                state: ReservationState::Held,
            },
        );

        Ok(ReservationToken {
            id,
            item_id: self.item_id,
            quantity,
        })
    }

    /// Validate that `token` is a live hold in this book; returns its quantity.
    pub fn held_quantity(&self, token: &ReservationToken) -> Result<u64, InventoryError> {
        if token.item_id != self.item_id {
            return Err(DomainError::invariant(format!(
                "reservation for item {} presented to item {}",
                token.item_id, self.item_id
            ))
            .into());
        }
        match self.entries.get(&token.id) {
            Some(entry) if entry.state == ReservationState::Held && entry.quantity == token.quantity => {
                Ok(entry.quantity)
            }
            _ => Err(InventoryError::ReservationNotHeld {
                item_id: self.item_id,
                reservation: token.id,
            }),
        }
    }

    /// `Held → Released`.
    pub fn release(&mut self, token: &ReservationToken) -> Result<(), InventoryError> {
        self.settle(token, ReservationState::Released)
    }

    /// `Held → Consumed`. Call only once the matching on-hand decrement is durable.
    pub fn mark_consumed(&mut self, token: &ReservationToken) -> Result<(), InventoryError> {
        self.settle(token, ReservationState::Consumed)
    }

    /// Forget settled tokens once nothing is held; keeps the book bounded.
    pub fn prune_settled(&mut self) {
        if self.outstanding == 0 {
            self.entries.clear();
        } else {
            self.entries.retain(|_, e| e.state == ReservationState::Held);
        }
    }

    fn settle(&mut self, token: &ReservationToken, to: ReservationState) -> Result<(), InventoryError> {
        let quantity = self.held_quantity(token)?;
        if let Some(entry) = self.entries.get_mut(&token.id) {
            entry.state = to;
        }
        self.outstanding -= quantity;
        Ok(())
    }
}
