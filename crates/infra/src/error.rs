//! Error types at the persistence boundary and at the operation boundary.

use thiserror::Error;

use invoicely_core::DomainError;

/// Errors reported by a [`crate::store::BillingStore`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique key or optimistic version check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("record not found")]
    NotFound,

    /// A write tried to move a record across companies.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// Backend failure (lock poisoned, connection lost, ...).
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Boundary error returned by every billing operation.
///
/// Ownership failures are reported as `NotFound` so callers cannot probe other
/// companies' records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("illegal status transition from {from} to {to}")]
    StateTransition { from: String, to: String },

    #[error("store error: {0}")]
    Store(String),
}

pub type BillingResult<T> = Result<T, BillingError>;

impl From<DomainError> for BillingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => BillingError::Validation(msg),
            DomainError::NotFound => BillingError::NotFound,
            DomainError::Conflict(msg) => BillingError::Conflict(msg),
            DomainError::StateTransition { from, to } => BillingError::StateTransition { from, to },
        }
    }
}

impl From<StoreError> for BillingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => BillingError::Conflict(msg),
            StoreError::NotFound | StoreError::TenantIsolation(_) => BillingError::NotFound,
            StoreError::Storage(msg) => BillingError::Store(msg),
        }
    }
}

impl BillingError {
    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Conflict(_) | BillingError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_violations_surface_as_not_found() {
        let err: BillingError = StoreError::TenantIsolation("company mismatch".into()).into();
        assert_eq!(err, BillingError::NotFound);
    }

    #[test]
    fn invariant_violations_surface_as_validation() {
        let err: BillingError = DomainError::invariant("paid invoices cannot be deleted").into();
        assert!(matches!(err, BillingError::Validation(_)));
        assert!(!err.is_retryable());
    }
}
