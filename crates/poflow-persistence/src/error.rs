//! Maps Diesel/connection errors to `poflow_core::WorkflowError`, the same
//! role `chem_persistence::error::PersistenceError` plays, except it targets
//! the core's error enum directly instead of an intermediate one — there's
//! no second consumer here that would need Diesel hidden from it.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use poflow_core::WorkflowError;

pub fn from_diesel(err: DieselError) -> WorkflowError {
    match err {
        DieselError::NotFound => WorkflowError::Internal("row not found".into()),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            WorkflowError::UniqueViolation(info.message().to_string())
        }
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            WorkflowError::TransientConnection("serialization conflict".into())
        }
        DieselError::DatabaseError(kind, info) => {
            WorkflowError::Internal(format!("db error {kind:?}: {}", info.message()))
        }
        DieselError::BrokenTransactionManager => {
            WorkflowError::TransientConnection("broken transaction manager".into())
        }
        other => WorkflowError::Internal(format!("unhandled diesel error: {other}")),
    }
}

pub fn is_retryable_message(msg: &str) -> bool {
    let m = msg.to_lowercase();
    m.contains("deadlock detected")
        || m.contains("could not serialize access due to concurrent update")
        || m.contains("terminating connection due to administrator command")
        || m.contains("connection closed")
        || m.contains("connection refused")
        || m.contains("timeout")
}
