//! Receipt journal: posting inbound goods receipts.
//!
//! A receipt is opened, filled and posted through its aggregate stream before any
//! stock moves, so every validation failure is clean. Restocking follows; a restock
//! that fails after posting is reported as `PartialPost` and logged at error level.
//! Posting is serialized by the journal lock, which keeps receipt numbers gap-free.
//! [`ReceiptJournal::open`] rebuilds the journal from the receipt streams, so
//! numbering carries on across restarts.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depot_core::{AggregateId, DomainError, Money};
use depot_inventory::ItemId;
use depot_parties::CounterpartyId;
use depot_receiving::{
    AddReceiptLine, GoodsReceipt, OpenReceipt, PostReceipt, ReceiptCommand, ReceiptId, ReceiptLine,
    ReceiptStatus, validate_line,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::directory::CounterpartyDirectory;
use crate::event_store::EventStore;
use crate::stock_ledger::{LedgerError, StockLedger};

pub const RECEIPT_AGGREGATE_TYPE: &str = "receiving.receipt";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReceivingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("unknown supplier {0}")]
    UnknownSupplier(CounterpartyId),

    #[error("supplier {0} is archived")]
    SupplierArchived(CounterpartyId),

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("receipt {doc_number} posted but only {restocked} of {lines} line(s) restocked: {cause}")]
    PartialPost {
        receipt_id: ReceiptId,
        doc_number: u64,
        restocked: usize,
        lines: usize,
        cause: String,
    },

    #[error("receipt journal lock poisoned")]
    Poisoned,
}

impl ReceivingError {
    pub fn is_fault(&self) -> bool {
        match self {
            ReceivingError::PartialPost { .. } | ReceivingError::Poisoned => true,
            ReceivingError::Ledger(e) => e.is_fault(),
            ReceivingError::Dispatch(DispatchError::Domain(_)) => false,
            ReceivingError::Dispatch(_) => true,
            _ => false,
        }
    }
}

/// One incoming line as entered by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLineInput {
    pub item_id: ItemId,
    pub quantity: u64,
    pub unit_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedReceipt {
    pub receipt_id: ReceiptId,
    pub doc_number: u64,
    pub supplier_id: CounterpartyId,
    pub supplier_name: String,
    pub lines: Vec<ReceiptLine>,
    pub total_cost: Money,
    pub posted_at: DateTime<Utc>,
}

fn make(id: AggregateId) -> GoodsReceipt {
    GoodsReceipt::empty(ReceiptId::new(id))
}

/// Journal entry for a posted receipt; `None` while the receipt is a draft.
fn posted_record(receipt: &GoodsReceipt, supplier_name: &str) -> Option<PostedReceipt> {
    if receipt.status() != ReceiptStatus::Posted {
        return None;
    }
    Some(PostedReceipt {
        receipt_id: receipt.id_typed(),
        doc_number: receipt.doc_number()?,
        supplier_id: receipt.supplier_id()?,
        supplier_name: supplier_name.to_string(),
        lines: receipt.lines().to_vec(),
        total_cost: receipt.total_cost(),
        posted_at: receipt.posted_at()?,
    })
}

pub struct ReceiptJournal<S> {
    dispatcher: CommandDispatcher<S>,
    ledger: Arc<StockLedger<S>>,
    directory: Arc<CounterpartyDirectory<S>>,
    posted: Mutex<Vec<PostedReceipt>>,
}

impl<S: EventStore> ReceiptJournal<S> {
    /// Journal over a store that holds no receipt streams yet.
    pub fn new(store: S, ledger: Arc<StockLedger<S>>, directory: Arc<CounterpartyDirectory<S>>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
            ledger,
            directory,
            posted: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild the journal from the receipt streams in `store`; numbering resumes
    /// after the highest posted receipt. Receipts that were never posted are skipped.
    pub fn open(
        store: S,
        ledger: Arc<StockLedger<S>>,
        directory: Arc<CounterpartyDirectory<S>>,
    ) -> Result<Self, ReceivingError> {
        let receipt_ids = store
            .stream_ids(RECEIPT_AGGREGATE_TYPE)
            .map_err(DispatchError::from)?;
        let dispatcher = CommandDispatcher::new(store);

        let mut posted = Vec::new();
        for aggregate_id in receipt_ids {
            let receipt: GoodsReceipt = dispatcher.load(aggregate_id, make)?;
            let Some(supplier_id) = receipt.supplier_id() else {
                continue;
            };
            let supplier = directory
                .get(supplier_id)?
                .ok_or(ReceivingError::UnknownSupplier(supplier_id))?;
            if let Some(record) = posted_record(&receipt, supplier.name()) {
                posted.push(record);
            }
        }
        posted.sort_by_key(|r| r.doc_number);

        tracing::info!(
            receipts = posted.len(),
            last_doc_number = posted.last().map(|r| r.doc_number).unwrap_or(0),
            "receipt journal opened"
        );
        Ok(Self {
            dispatcher,
            ledger,
            directory,
            posted: Mutex::new(posted),
        })
    }

    /// Record goods received from `supplier` and put them on hand.
    pub fn post_receipt(
        &self,
        supplier_id: CounterpartyId,
        lines: &[ReceiptLineInput],
        now: DateTime<Utc>,
    ) -> Result<PostedReceipt, ReceivingError> {
        let mut posted = self.posted.lock().map_err(|_| ReceivingError::Poisoned)?;

        let supplier = self
            .directory
            .get(supplier_id)?
            .ok_or(ReceivingError::UnknownSupplier(supplier_id))?;
        if !supplier.can_transact() {
            return Err(ReceivingError::SupplierArchived(supplier_id));
        }
        if lines.is_empty() {
            return Err(DomainError::validation("a receipt needs at least one line").into());
        }
        for line in lines {
            validate_line(line.quantity, line.unit_cost)?;
            if !self.ledger.contains(line.item_id)? {
                return Err(ReceivingError::UnknownItem(line.item_id));
            }
        }

        let receipt_id = ReceiptId::new(AggregateId::new());
        self.send(ReceiptCommand::OpenReceipt(OpenReceipt {
            receipt_id,
            supplier_id,
            occurred_at: now,
        }))?;
        for line in lines {
            self.send(ReceiptCommand::AddReceiptLine(AddReceiptLine {
                receipt_id,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_cost: line.unit_cost,
                occurred_at: now,
            }))?;
        }

        let doc_number = posted.last().map(|r| r.doc_number).unwrap_or(0) + 1;
        let receipt = self.send(ReceiptCommand::PostReceipt(PostReceipt {
            receipt_id,
            doc_number,
            occurred_at: now,
        }))?;
        let record = posted_record(&receipt, supplier.name()).ok_or_else(|| {
            DomainError::invariant(format!("receipt {receipt_id} is not posted after posting"))
        })?;
        // The number is spent once the receipt is posted, whatever happens to stock.
        posted.push(record.clone());

        for (restocked, line) in receipt.lines().iter().enumerate() {
            if let Err(err) = self.ledger.restock(line.item_id, line.quantity, line.unit_cost, now) {
                tracing::error!(
                    %receipt_id,
                    doc_number,
                    item_id = %line.item_id,
                    restocked,
                    error = %err,
                    "receipt posted but restock failed"
                );
                return Err(ReceivingError::PartialPost {
                    receipt_id,
                    doc_number,
                    restocked,
                    lines: receipt.lines().len(),
                    cause: err.to_string(),
                });
            }
        }

        tracing::info!(
            %receipt_id,
            doc_number,
            supplier = supplier.name(),
            lines = record.lines.len(),
            total_cost = %record.total_cost,
            "receipt posted"
        );
        Ok(record)
    }

    /// Posted receipts in document-number order.
    pub fn all(&self) -> Result<Vec<PostedReceipt>, ReceivingError> {
        let posted = self.posted.lock().map_err(|_| ReceivingError::Poisoned)?;
        Ok(posted.clone())
    }

    pub fn by_doc_number(&self, doc_number: u64) -> Result<Option<PostedReceipt>, ReceivingError> {
        Ok(self.all()?.into_iter().find(|r| r.doc_number == doc_number))
    }

    /// Receipt aggregate as recorded in its stream, posted or not.
    pub fn load(&self, receipt_id: ReceiptId) -> Result<Option<GoodsReceipt>, ReceivingError> {
        let receipt: GoodsReceipt = self.dispatcher.load(receipt_id.0, make)?;
        Ok(receipt.is_created().then_some(receipt))
    }

    fn send(&self, command: ReceiptCommand) -> Result<GoodsReceipt, ReceivingError> {
        let receipt_id = match &command {
            ReceiptCommand::OpenReceipt(c) => c.receipt_id,
            ReceiptCommand::AddReceiptLine(c) => c.receipt_id,
            ReceiptCommand::PostReceipt(c) => c.receipt_id,
        };
        Ok(self
            .dispatcher
            .dispatch(receipt_id.0, RECEIPT_AGGREGATE_TYPE, command, make)?)
    }
}
