//! Wiring of the in-process stores, ledgers and the deal hand-off.

use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use depot_events::{EventBus, InMemoryEventBus};
use depot_infra::{
    CommitCoordinator, CounterpartyDirectory, DealEnvelope, DealLedgerError, DepotConfig,
    DraftManager, InMemoryEventStore, LedgerError, ReceiptJournal, ReceivingError, StockLedger,
    StoredDealLedger,
};

pub type Store = Arc<InMemoryEventStore>;
pub type Deals = Arc<StoredDealLedger<Store>>;
pub type Bus = Arc<InMemoryEventBus<DealEnvelope>>;
pub type Coordinator = CommitCoordinator<Store, Deals, Bus>;

pub struct Services {
    pub store: Store,
    pub ledger: Arc<StockLedger<Store>>,
    pub directory: Arc<CounterpartyDirectory<Store>>,
    pub deals: Deals,
    pub bus: Bus,
    pub drafts: DraftManager,
    pub coordinator: Coordinator,
    pub receipts: ReceiptJournal<Store>,
}

/// A component refused to replay the store it was opened on.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("stock ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("deal ledger: {0}")]
    Deals(#[from] DealLedgerError),

    #[error("receipt journal: {0}")]
    Receipts(#[from] ReceivingError),
}

/// Build every component over a fresh in-memory store.
pub fn build_services(config: &DepotConfig) -> Result<Services, StartupError> {
    build_services_on(Arc::new(InMemoryEventStore::new()), config)
}

/// Build every component over `store`, replaying the item, deal and receipt
/// streams it holds. Drafts are not persisted and start empty.
pub fn build_services_on(store: Store, config: &DepotConfig) -> Result<Services, StartupError> {
    let ledger = Arc::new(StockLedger::open(store.clone(), config.cost_policy)?);
    let directory = Arc::new(CounterpartyDirectory::new(store.clone()));
    let deals: Deals = Arc::new(StoredDealLedger::open(store.clone())?);
    let receipts = ReceiptJournal::open(store.clone(), ledger.clone(), directory.clone())?;
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    Ok(Services {
        coordinator: CommitCoordinator::new(ledger.clone(), directory.clone(), deals.clone(), bus.clone()),
        receipts,
        drafts: DraftManager::new(config.draft_ttl()),
        store,
        ledger,
        directory,
        deals,
        bus,
    })
}

/// Hand recorded deals to document generation. Rendering lives outside the core;
/// this side only logs the hand-off. Ends when the bus is dropped.
pub fn spawn_document_handoff(bus: &Bus) -> JoinHandle<usize> {
    let subscription = bus.subscribe();
    std::thread::spawn(move || {
        let mut handed_off = 0;
        while let Ok(envelope) = subscription.recv() {
            let deal = &envelope.payload().deal;
            tracing::info!(
                deal_id = %deal.id(),
                doc_number = deal.doc_number(),
                counterparty = deal.counterparty_name(),
                total = %deal.total_revenue(),
                "deal ready for document generation"
            );
            handed_off += 1;
        }
        handed_off
    })
}
