use serde::Serialize;
use thiserror::Error;

use depot_core::DomainError;
use depot_infra::command_dispatcher::DispatchError;
use depot_infra::{
    CommitError, DealLedgerError, LedgerError, ReceivingError, ReportError, SessionError,
};
use depot_inventory::InventoryError;
use depot_shipping::DraftError;

/// Error as shown to the operator. `fault` marks internal-consistency failures that
/// need an administrator rather than a corrected request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{code}: {message}")]
pub struct DeskError {
    pub code: &'static str,
    pub message: String,
    pub fault: bool,
}

impl DeskError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fault: false,
        }
    }

    pub fn fault(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fault: true,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }
}

impl From<DomainError> for DeskError {
    fn from(err: DomainError) -> Self {
        let code = match &err {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
        };
        Self::new(code, err.to_string())
    }
}

impl From<DraftError> for DeskError {
    fn from(err: DraftError) -> Self {
        match err {
            DraftError::Domain(e) => e.into(),
            DraftError::InvalidState { .. } => Self::new("invalid_draft_state", err.to_string()),
            DraftError::LineNotFound { .. } => Self::new("line_not_found", err.to_string()),
        }
    }
}

impl From<SessionError> for DeskError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoActiveDraft(_) => Self::new("no_active_draft", err.to_string()),
            SessionError::DraftBusy(_) => Self::new("draft_busy", err.to_string()),
            SessionError::Draft(e) => e.into(),
            SessionError::Poisoned => Self::fault("internal_error", err.to_string()),
        }
    }
}

impl From<InventoryError> for DeskError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Domain(e) => e.into(),
            InventoryError::InsufficientStock { .. } => Self::new("insufficient_stock", err.to_string()),
            InventoryError::CostBasisExhausted { .. } => {
                Self::fault("cost_basis_exhausted", err.to_string())
            }
            InventoryError::ReservationNotHeld { .. } => Self::fault("reservation_not_held", err.to_string()),
        }
    }
}

impl From<LedgerError> for DeskError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Inventory(e) => e.into(),
            LedgerError::UnknownItem(_) => Self::new("unknown_item", err.to_string()),
            LedgerError::DuplicateCode(_) => Self::new("conflict", err.to_string()),
            other => Self::fault("ledger_error", other.to_string()),
        }
    }
}

impl From<DispatchError> for DeskError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Domain(e) => e.into(),
            other => Self::fault("store_error", other.to_string()),
        }
    }
}

impl From<CommitError> for DeskError {
    fn from(err: CommitError) -> Self {
        let fault = err.is_fault();
        let code = match &err {
            CommitError::InvalidDraftState { .. } => "invalid_draft_state",
            CommitError::MissingCounterparty => "missing_counterparty",
            CommitError::UnknownCounterparty(_) => "unknown_counterparty",
            CommitError::CounterpartyArchived(_) => "counterparty_archived",
            CommitError::UnknownItem(_) => "unknown_item",
            CommitError::InsufficientStock { .. } => "insufficient_stock",
            CommitError::PartialCommitFault(_) => "partial_commit_fault",
            CommitError::Ledger(_) => "ledger_error",
            CommitError::Directory(_) => "store_error",
        };
        Self {
            code,
            message: err.to_string(),
            fault,
        }
    }
}

impl From<DealLedgerError> for DeskError {
    fn from(err: DealLedgerError) -> Self {
        match err {
            DealLedgerError::Domain(e) => e.into(),
            other => Self::fault("deal_ledger_error", other.to_string()),
        }
    }
}

impl From<ReceivingError> for DeskError {
    fn from(err: ReceivingError) -> Self {
        let fault = err.is_fault();
        match err {
            ReceivingError::Domain(e) => e.into(),
            ReceivingError::Dispatch(e) => e.into(),
            ReceivingError::Ledger(e) => e.into(),
            ReceivingError::UnknownSupplier(_) => Self::new("unknown_counterparty", err.to_string()),
            ReceivingError::SupplierArchived(_) => Self::new("counterparty_archived", err.to_string()),
            ReceivingError::UnknownItem(_) => Self::new("unknown_item", err.to_string()),
            ReceivingError::PartialPost { .. } | ReceivingError::Poisoned => Self {
                code: "partial_post",
                message: err.to_string(),
                fault,
            },
        }
    }
}

impl From<ReportError> for DeskError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::InvalidPeriod(_) => Self::new("invalid_period", err.to_string()),
            ReportError::Ledger(e) => e.into(),
            ReportError::Deals(e) => e.into(),
            ReportError::Csv(_) | ReportError::Io(_) => Self::fault("export_error", err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{AggregateId, OperatorId};
    use depot_inventory::ItemId;
    use depot_shipping::DraftState;

    #[test]
    fn insufficient_stock_is_operator_correctable() {
        let err: DeskError = CommitError::InsufficientStock {
            item_id: ItemId::new(AggregateId::new()),
            requested: 3,
            available: 2,
        }
        .into();

        assert_eq!(err.code, "insufficient_stock");
        assert!(!err.fault);
    }

    #[test]
    fn exhausted_cost_basis_is_a_fault_on_every_path() {
        let exhausted = InventoryError::CostBasisExhausted {
            item_id: ItemId::new(AggregateId::new()),
            requested: 3,
            remaining: 0,
        };

        let direct: DeskError = exhausted.clone().into();
        assert_eq!(direct.code, "cost_basis_exhausted");
        assert!(direct.fault);

        let via_ledger: DeskError = LedgerError::Inventory(exhausted.clone()).into();
        assert_eq!(via_ledger, direct);

        let via_commit: DeskError = CommitError::from(LedgerError::Inventory(exhausted)).into();
        assert!(via_commit.fault);
    }

    #[test]
    fn duplicate_item_code_is_a_conflict() {
        let err: DeskError = LedgerError::DuplicateCode(77).into();
        assert_eq!(err.code, "conflict");
        assert!(!err.fault);
    }

    #[test]
    fn session_errors_keep_their_draft_cause() {
        let err: DeskError = SessionError::Draft(DraftError::InvalidState {
            state: DraftState::Building,
            action: "confirm",
        })
        .into();
        assert_eq!(err.code, "invalid_draft_state");

        let busy: DeskError = SessionError::DraftBusy(OperatorId::new("op").unwrap()).into();
        assert_eq!(busy.code, "draft_busy");
    }

    #[test]
    fn serializes_code_message_and_fault() {
        let err = DeskError::fault("partial_commit_fault", "draft consumed 1 line(s)");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "code": "partial_commit_fault",
                "message": "draft consumed 1 line(s)",
                "fault": true
            })
        );
    }
}
