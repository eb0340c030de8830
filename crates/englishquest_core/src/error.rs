//! crates/englishquest_core/src/error.rs
//!
//! The structured error taxonomy returned by every engine operation.

use uuid::Uuid;

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Malformed or out-of-range input. Nothing was mutated.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The lesson is locked, hearts are depleted, or the resource is not the caller's.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds: item costs {price} coins, balance is {balance}")]
    InsufficientFunds { price: u64, balance: u64 },

    /// A concurrent write for the same user won the race. Safe to retry the whole operation.
    #[error("Conflicting concurrent update: {0}")]
    ConflictRetryable(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The practice session was already submitted. Nothing was mutated.
    #[error("Session {0} was already submitted")]
    AlreadyApplied(Uuid),
}

impl EngineError {
    /// A stable, machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::AccessDenied(_) => "access_denied",
            EngineError::NotFound(_) => "not_found",
            EngineError::InsufficientFunds { .. } => "insufficient_funds",
            EngineError::ConflictRetryable(_) => "conflict_retryable",
            EngineError::StorageUnavailable(_) => "storage_unavailable",
            EngineError::AlreadyApplied(_) => "already_applied",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConflictRetryable(_) | EngineError::StorageUnavailable(_)
        )
    }
}

impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => EngineError::NotFound(what),
            PortError::Conflict(what) => EngineError::ConflictRetryable(what),
            PortError::Duplicate(what) => EngineError::Validation(what),
            PortError::AlreadyApplied(id) => EngineError::AlreadyApplied(id),
            PortError::Unavailable(what) | PortError::Unexpected(what) => {
                EngineError::StorageUnavailable(what)
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_never_surface_raw() {
        let err: EngineError = PortError::Unexpected("connection reset".into()).into();
        assert_eq!(err.kind(), "storage_unavailable");
        assert!(err.is_retryable());

        let err: EngineError = PortError::Conflict("version 3".into()).into();
        assert_eq!(err.kind(), "conflict_retryable");

        let err: EngineError = PortError::Duplicate("username".into()).into();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!err.is_retryable());
    }
}
