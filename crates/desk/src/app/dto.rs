use serde::{Deserialize, Serialize};

use depot_core::Money;
use depot_infra::{ItemSnapshot, PostedReceipt, SalesReport, StockReport};
use depot_infra::reports::Period;
use depot_parties::{ContactInfo, Counterparty, CounterpartyId, CounterpartyStatus};
use depot_shipping::{Deal, DraftId, ShipmentDraft};

use crate::app::errors::DeskError;

// -------------------------
// Requests
// -------------------------

/// One line of the operator protocol: who is acting and what they asked for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeskRequest {
    pub operator: String,
    #[serde(flatten)]
    pub action: OperatorAction,
}

/// Amounts are written in major units ("1311.50", "12,5"); counterparties by id
/// or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OperatorAction {
    StartDraft,
    ChooseCounterparty {
        counterparty: String,
    },
    /// Without a price, the last price charged to the chosen counterparty is used,
    /// then the item's retail price.
    AddLine {
        item_code: u32,
        quantity: u64,
        price: Option<String>,
    },
    UpdateLine {
        line_no: u32,
        quantity: Option<u64>,
        price: Option<String>,
    },
    RemoveLine {
        line_no: u32,
    },
    RequestCheckout,
    EditDraft,
    ConfirmCommit {
        counterparty: Option<String>,
    },
    CancelDraft,
    ShowDraft,

    PostReceipt {
        supplier: String,
        lines: Vec<ReceiptLineRequest>,
    },
    StockReport,
    SalesReport {
        period: Period,
    },
    ExportSales {
        period: Period,
    },

    CreateItem {
        code: u32,
        name: String,
        retail_price: String,
    },
    UpdateItem {
        item_code: u32,
        name: Option<String>,
        retail_price: Option<String>,
    },
    RegisterCounterparty {
        name: String,
        contact: Option<ContactInfo>,
    },
    UpdateCounterparty {
        counterparty: String,
        name: Option<String>,
        contact: Option<ContactInfo>,
    },
    ArchiveCounterparty {
        counterparty: String,
    },
    ListCounterparties,
}

impl OperatorAction {
    /// Wire name of the action, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorAction::StartDraft => "startDraft",
            OperatorAction::ChooseCounterparty { .. } => "chooseCounterparty",
            OperatorAction::AddLine { .. } => "addLine",
            OperatorAction::UpdateLine { .. } => "updateLine",
            OperatorAction::RemoveLine { .. } => "removeLine",
            OperatorAction::RequestCheckout => "requestCheckout",
            OperatorAction::EditDraft => "editDraft",
            OperatorAction::ConfirmCommit { .. } => "confirmCommit",
            OperatorAction::CancelDraft => "cancelDraft",
            OperatorAction::ShowDraft => "showDraft",
            OperatorAction::PostReceipt { .. } => "postReceipt",
            OperatorAction::StockReport => "stockReport",
            OperatorAction::SalesReport { .. } => "salesReport",
            OperatorAction::ExportSales { .. } => "exportSales",
            OperatorAction::CreateItem { .. } => "createItem",
            OperatorAction::UpdateItem { .. } => "updateItem",
            OperatorAction::RegisterCounterparty { .. } => "registerCounterparty",
            OperatorAction::UpdateCounterparty { .. } => "updateCounterparty",
            OperatorAction::ArchiveCounterparty { .. } => "archiveCounterparty",
            OperatorAction::ListCounterparties => "listCounterparties",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLineRequest {
    pub item_code: u32,
    pub quantity: u64,
    pub unit_cost: String,
}

// -------------------------
// Replies
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    #[serde(flatten)]
    pub draft: ShipmentDraft,
    pub total_price: Money,
}

impl From<ShipmentDraft> for DraftView {
    fn from(draft: ShipmentDraft) -> Self {
        Self {
            total_price: draft.total_price(),
            draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartyView {
    pub id: CounterpartyId,
    pub name: String,
    pub status: CounterpartyStatus,
    pub contact: ContactInfo,
}

impl From<&Counterparty> for CounterpartyView {
    fn from(cp: &Counterparty) -> Self {
        Self {
            id: cp.id_typed(),
            name: cp.name().to_string(),
            status: cp.status(),
            contact: cp.contact().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DeskReply {
    Draft {
        draft: DraftView,
    },
    Committed {
        deal: Deal,
    },
    Cancelled {
        draft_id: DraftId,
    },
    NoDraft,
    Receipt {
        receipt: PostedReceipt,
    },
    Stock {
        report: StockReport,
    },
    Sales {
        report: SalesReport,
    },
    Csv {
        rows: usize,
        content: String,
    },
    Item {
        item: ItemSnapshot,
    },
    Counterparty {
        counterparty: CounterpartyView,
    },
    Counterparties {
        counterparties: Vec<CounterpartyView>,
    },
}

/// Wire form of a handled request: `{"ok":true,"reply":...}` or
/// `{"ok":false,"error":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeskResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<DeskReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeskError>,
}

impl From<Result<DeskReply, DeskError>> for DeskResponse {
    fn from(result: Result<DeskReply, DeskError>) -> Self {
        match result {
            Ok(reply) => Self {
                ok: true,
                reply: Some(reply),
                error: None,
            },
            Err(error) => Self {
                ok: false,
                reply: None,
                error: Some(error),
            },
        }
    }
}
