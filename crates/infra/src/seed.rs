//! Demo data for local runs: a handful of counterparties and catalogue items.
//!
//! Seeding only fills what is empty, so it is safe to run on every start.

use chrono::{DateTime, Utc};
use thiserror::Error;

use depot_core::Money;
use depot_inventory::ItemDetails;

use crate::command_dispatcher::DispatchError;
use crate::directory::CounterpartyDirectory;
use crate::event_store::EventStore;
use crate::stock_ledger::{LedgerError, StockLedger};

pub const COUNTERPARTIES: [&str; 7] = [
    "Абил Вешки",
    "АЙК",
    "Ариф",
    "Вектор",
    "Витя камри",
    "ВЛДВ",
    "Вова Снек",
];

/// code, name, retail price and purchase price in minor units.
pub const ITEMS: [(u32, &str, i64, i64); 3] = [
    (23, "Лосось 6-7", 131150, 130000),
    (40, "Форель радужная 1.8-2.7", 99500, 96018),
    (49, "Навага М", 0, 0),
];

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Directory(#[from] DispatchError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub counterparties: usize,
    pub items: usize,
    pub lots: usize,
}

/// Register the demo counterparties and items when none exist yet. Items with a
/// known purchase price get an opening lot of `opening_quantity` units at that price.
pub fn seed<S: EventStore>(
    ledger: &StockLedger<S>,
    directory: &CounterpartyDirectory<S>,
    opening_quantity: u64,
    now: DateTime<Utc>,
) -> Result<SeedSummary, SeedError> {
    let mut summary = SeedSummary::default();

    if directory.list()?.is_empty() {
        for name in COUNTERPARTIES {
            directory.register(name, None, now)?;
            summary.counterparties += 1;
        }
    }

    if ledger.list()?.is_empty() {
        for (code, name, retail, purchase) in ITEMS {
            let item_id = ledger.create_item(
                ItemDetails {
                    code,
                    name: name.to_string(),
                    retail_price: Money::from_minor(retail),
                },
                now,
            )?;
            summary.items += 1;

            if purchase > 0 && opening_quantity > 0 {
                ledger.restock(item_id, opening_quantity, Money::from_minor(purchase), now)?;
                summary.lots += 1;
            }
        }
    }

    tracing::info!(
        counterparties = summary.counterparties,
        items = summary.items,
        lots = summary.lots,
        "demo data seeded"
    );
    Ok(summary)
}
