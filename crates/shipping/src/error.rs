use thiserror::Error;

use depot_core::DomainError;

use crate::draft::DraftState;

/// Failures raised while editing a shipment draft. All are operator-correctable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("cannot {action} while the draft is {state}")]
    InvalidState {
        state: DraftState,
        action: &'static str,
    },

    #[error("draft has no line {line_no}")]
    LineNotFound { line_no: u32 },
}
