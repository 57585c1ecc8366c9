//! The uniform stage contract (spec §4.4).
//!
//! Generalizes `chem_core::step::StepDefinition`: a `Job` replaces
//! `ExecutionContext`, a `StageOutcome` replaces `StepRunResult`. The
//! branching/signal machinery the teacher's steps support (`StepRunResult`
//! has variants for re-dispatch, wait, and branch) is dropped — this
//! pipeline is strictly linear, so a processor either produces an outcome or
//! returns a `WorkflowError` and lets the orchestrator decide what happens
//! next, exactly as `FlowEngine` (not the step) owns continuation for the
//! teacher.

use crate::errors::WorkflowError;
use crate::progress_fabric::ProgressPublisher;
use async_trait::async_trait;
use poflow_domain::StageTag;
use serde_json::Value;

/// How a workflow's stages get dispatched (spec §4.6/§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Each stage completion enqueues the next stage as a separate job.
    Queued,
    /// Stages run back-to-back in the same task, subject to a wall-clock
    /// budget (handled by the Sequential Runner, not the processor).
    Sequential,
}

/// The unit of work handed to a `StageProcessor`. Carries everything a
/// processor needs without reaching into shared state directly — mirrors
/// `ExecutionContext` holding input + params for a chemflow step.
#[derive(Debug, Clone)]
pub struct Job {
    pub workflow_id: String,
    pub merchant_id: String,
    pub upload_id: String,
    pub purchase_order_id: Option<String>,
    pub stage: StageTag,
    /// Carried `next_stage_data` from the previous stage (spec §4.4 item 1).
    pub data: Value,
    pub mode: ExecutionMode,
    pub attempt: u32,
}

/// What a `StageProcessor::process` call hands back on success.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Stage-specific result payload, folded into the workflow's audit trail.
    pub result: Value,
    /// Data the next stage's `Job::data` will carry.
    pub next_stage_data: Value,
    /// Set once a purchase order row exists (from `database_save` onward).
    pub purchase_order_id: Option<String>,
}

/// Bundles a `Job` with the handles a processor is allowed to touch directly.
/// Everything else (workflow-row transitions, retry bookkeeping, queueing
/// the next stage) stays with the orchestrator — a single writer for the
/// workflow aggregate, same discipline the teacher's `FlowEngine` keeps over
/// its event log.
pub struct StageContext<'a> {
    pub job: &'a Job,
    pub progress: &'a dyn ProgressPublisher,
}

#[async_trait]
pub trait StageProcessor: Send + Sync {
    fn stage(&self) -> StageTag;

    /// Executes the stage's business logic. Implementations publish
    /// intermediate progress sparsely via `ctx.progress` (spec §4.1) and
    /// return `Err` for anything the orchestrator's failure policy should
    /// classify (spec §7).
    async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError>;
}
