//! Domain-level validation errors.
//!
//! These are raised by constructors and invariant checks on entities
//! (`PurchaseOrder`, `LineItem`, ...) before anything ever reaches a
//! persistence or orchestration layer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("arithmetic invariant violated: {0}")]
    Arithmetic(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Serialization(e.to_string())
    }
}
