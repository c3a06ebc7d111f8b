//! Errors raised by domain rules.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic rule failures of the domain crates. Storage, locking and
/// transport failures are reported by the infra layer with its own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Rejected input: zero quantity, negative price, blank name, bad amount.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command does not fit the aggregate's current state.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The aggregate stream holds no creation event.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Stale stream version or duplicate creation.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(kind: &'static str) -> Self {
        Self::NotFound(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_missing_kind() {
        assert_eq!(DomainError::not_found("item").to_string(), "item not found");
    }
}
