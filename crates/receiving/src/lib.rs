//! Goods receipts (inbound shipments, event-sourced).
//!
//! A receipt is a supplier-facing document listing what arrived and at what unit
//! cost. Posting it is what restocks inventory; that side effect lives in infra.

pub mod receipt;

pub use receipt::{
    AddReceiptLine, GoodsReceipt, OpenReceipt, PostReceipt, ReceiptCommand, ReceiptEvent,
    ReceiptId, ReceiptLine, ReceiptLineAdded, ReceiptOpened, ReceiptPosted, ReceiptStatus,
    validate_line,
};
