//! Error kinds for the orchestration core (spec §7).
//!
//! Shaped directly on `chem_core::errors::CoreEngineError`: a flat
//! `thiserror` enum plus a `classify` helper the orchestrator uses to decide
//! retry vs. terminal failure, mirroring `chem_persistence::error`'s
//! `classify_error`/`ErrorClass` split.

use poflow_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum WorkflowError {
    #[error("transient connection error: {0}")]
    TransientConnection(String),

    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("transaction exceeded its budget: {0}")]
    TransactionTimeout(String),

    #[error("extractor returned incomplete data: {0}")]
    ParseIncomplete(String),

    #[error("extractor unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("stage {0:?} exceeded its soft budget")]
    StageTimeout(poflow_domain::StageTag),

    #[error("non-fatal error in stage {0:?}: {1}")]
    NonFatal(poflow_domain::StageTag, String),

    #[error("workflow stuck: {0}")]
    WorkflowStuck(String),

    #[error("persistence save failed: {0}")]
    SaveFailed(String),

    #[error("domain invariant violated: {0}")]
    Domain(#[from] DomainError),

    #[error("workflow already completed")]
    WorkflowCompleted,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Retry/failure classification used by the orchestrator's failure policy
/// (spec §7 "Propagation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry within the stage, bounded by the per-kind ceiling.
    Retryable,
    /// Non-retryable: fail the stage (and, unless the stage is non-fatal,
    /// the workflow) immediately.
    Terminal,
    /// Never fails the workflow; the stage completes with a recorded
    /// warning and the pipeline advances.
    NonFatal,
}

impl WorkflowError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            WorkflowError::TransientConnection(_) => ErrorClass::Retryable,
            WorkflowError::ExtractorUnavailable(_) => ErrorClass::Retryable,
            WorkflowError::ParseIncomplete(_) => ErrorClass::Retryable,
            WorkflowError::NonFatal(_, _) => ErrorClass::NonFatal,
            WorkflowError::UniqueViolation(_) => ErrorClass::Terminal,
            WorkflowError::TransactionTimeout(_) => ErrorClass::Terminal,
            WorkflowError::StageTimeout(_) => ErrorClass::Terminal,
            WorkflowError::WorkflowStuck(_) => ErrorClass::Terminal,
            WorkflowError::SaveFailed(_) => ErrorClass::Terminal,
            WorkflowError::Domain(_) => ErrorClass::Terminal,
            WorkflowError::WorkflowCompleted => ErrorClass::Terminal,
            WorkflowError::Internal(_) => ErrorClass::Terminal,
        }
    }

    /// Retry ceiling for this error kind (spec §7 table): the total number
    /// of attempts allowed, including the first. `0` for kinds that never
    /// retry. `ParseIncomplete` is 2 (one automatic retry, per spec §4.4
    /// S1 "Incomplete parse triggers one automatic retry") rather than 1,
    /// since a ceiling of 1 would reject even the first attempt's retry.
    pub fn retry_ceiling(&self) -> u32 {
        match self {
            WorkflowError::TransientConnection(_) => 5,
            WorkflowError::ExtractorUnavailable(_) => 3,
            WorkflowError::ParseIncomplete(_) => 2,
            _ => 0,
        }
    }
}
