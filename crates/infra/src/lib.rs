//! Infrastructure layer: event store, stock and deal ledgers, draft sessions, the
//! commit coordinator, receipts, reports and configuration.

pub mod command_dispatcher;
pub mod commit;
pub mod config;
pub mod deal_ledger;
pub mod directory;
pub mod event_store;
pub mod receipts;
pub mod reports;
pub mod seed;
pub mod sessions;
pub mod stock_ledger;

mod integration_tests;

pub use commit::{CommitCoordinator, CommitError, DealEnvelope, PartialCommitFault};
pub use config::{ConfigError, DepotConfig};
pub use deal_ledger::{DealLedger, DealLedgerError, InMemoryDealLedger, StoredDealLedger};
pub use directory::CounterpartyDirectory;
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore};
pub use receipts::{PostedReceipt, ReceiptJournal, ReceiptLineInput, ReceivingError};
pub use reports::{Period, ReportError, SalesReport, StockReport};
pub use sessions::{DraftManager, SessionError};
pub use stock_ledger::{ItemSnapshot, LedgerError, StockLedger};
