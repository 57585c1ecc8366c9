//! The Orchestrator (C5): the single writer over the `Workflow` aggregate.
//!
//! Shaped on `chem_core::engine::FlowEngine`: a `next_with`-style dispatch
//! loop that loads state, runs exactly one stage, and decides what happens
//! next based on the outcome. Differences from the teacher, all load-bearing
//! for this spec rather than cosmetic:
//!   - async throughout (every boundary here is an I/O suspension point,
//!     spec §0/§4.4), where the teacher is synchronous;
//!   - no event-sourced replay — `Workflow` is a mutable row the repository
//!     persists directly, so there's no `EventStore`/fingerprint machinery;
//!   - stage continuation can mean "enqueue" or "return to caller for the
//!     sequential runner to chain", per `ExecutionMode` (spec §4.6/§4.9),
//!     where the teacher always just calls `next()` again in its own loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use poflow_domain::{StageTag, Workflow};

use crate::errors::{ErrorClass, WorkflowError};
use crate::kv::WorkflowMetadataStore;
use crate::progress_fabric::ProgressPublisher;
use crate::queue::{Queue, QueueJob};
use crate::repo::WorkflowRepository;
use crate::stage::{ExecutionMode, Job, StageContext, StageOutcome, StageProcessor};

/// TTL on the idempotent-start lock (spec §4.2).
const START_LOCK_TTL: Duration = Duration::from_secs(300);

pub struct Orchestrator {
    repo: Arc<dyn WorkflowRepository>,
    kv: Arc<dyn WorkflowMetadataStore>,
    progress: Arc<dyn ProgressPublisher>,
    queue: Arc<dyn Queue>,
    processors: HashMap<StageTag, Arc<dyn StageProcessor>>,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn WorkflowRepository>,
        kv: Arc<dyn WorkflowMetadataStore>,
        progress: Arc<dyn ProgressPublisher>,
        queue: Arc<dyn Queue>,
    ) -> Self {
        Self { repo, kv, progress, queue, processors: HashMap::new() }
    }

    pub fn register_processor(&mut self, processor: Arc<dyn StageProcessor>) {
        self.processors.insert(processor.stage(), processor);
    }

    fn processor_for(&self, stage: StageTag) -> Result<Arc<dyn StageProcessor>, WorkflowError> {
        self.processors
            .get(&stage)
            .cloned()
            .ok_or_else(|| WorkflowError::Internal(format!("no processor registered for {:?}", stage)))
    }

    /// Starts a workflow idempotently (spec §4.2): a repeat start for the
    /// same `upload_id` returns the existing workflow rather than creating a
    /// second one. The lock is a `set_if_absent` against the KV fabric, not
    /// a DB unique constraint, so it also covers the narrow race between two
    /// concurrent first-time starts.
    pub async fn start_workflow(
        &self,
        workflow_id: String,
        upload_id: String,
        merchant_id: String,
        mode: ExecutionMode,
        initial_data: serde_json::Value,
    ) -> Result<Workflow, WorkflowError> {
        if let Some(existing) = self.repo.find_by_upload(&upload_id).await? {
            info!("workflow already started for upload {upload_id}, returning existing {}", existing.id);
            return Ok(existing);
        }

        let lock_key = format!("start-lock:{upload_id}");
        let acquired = self
            .kv
            .set_if_absent(&lock_key, serde_json::json!({ "workflow_id": workflow_id }), START_LOCK_TTL)
            .await;

        if !acquired {
            // Someone else is mid-start for this upload; surface whatever
            // they end up creating rather than racing them.
            if let Some(existing) = self.repo.find_by_upload(&upload_id).await? {
                return Ok(existing);
            }
            return Err(WorkflowError::Internal(format!(
                "start lock held for upload {upload_id} but no workflow row exists yet"
            )));
        }

        let now = Utc::now();
        let workflow = Workflow::new(workflow_id.clone(), upload_id, merchant_id.clone(), now);
        self.repo.insert(&workflow).await?;

        let first_stage = StageTag::ORDER[0];
        let job = Job {
            workflow_id: workflow.id.clone(),
            merchant_id,
            upload_id: workflow.upload_id.clone(),
            purchase_order_id: None,
            stage: first_stage,
            data: initial_data,
            mode,
            attempt: 1,
        };

        match mode {
            ExecutionMode::Queued => {
                self.queue
                    .enqueue(QueueJob {
                        workflow_id: job.workflow_id,
                        merchant_id: job.merchant_id,
                        upload_id: job.upload_id,
                        purchase_order_id: job.purchase_order_id,
                        stage: job.stage,
                        data: job.data,
                        attempt: job.attempt,
                    })
                    .await;
            }
            ExecutionMode::Sequential => {
                // The caller (Sequential Runner) drives the chain from here;
                // starting doesn't itself run a stage.
            }
        }

        Ok(workflow)
    }

    /// Runs exactly one stage for `job`, updating and persisting the
    /// workflow row, then either enqueues the next stage (Queued mode) or
    /// returns the next `Job` for the caller to run immediately (Sequential
    /// mode). Returns `Ok(None)` once the workflow has reached a terminal
    /// state.
    pub async fn run_stage(&self, job: Job) -> Result<Option<Job>, WorkflowError> {
        let mut workflow = self
            .repo
            .find(&job.workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::Internal(format!("unknown workflow {}", job.workflow_id)))?;

        if workflow.status == poflow_domain::WorkflowStatus::Completed
            || workflow.status == poflow_domain::WorkflowStatus::Failed
        {
            return Err(WorkflowError::WorkflowCompleted);
        }

        workflow.begin_stage(job.stage, Utc::now());
        self.repo.update(&workflow).await?;

        let processor = self.processor_for(job.stage)?;
        let ctx = StageContext { job: &job, progress: self.progress.as_ref() };

        match processor.process(&ctx).await {
            Ok(outcome) => self.handle_stage_success(workflow, job, outcome).await,
            Err(err) => self.handle_stage_failure(workflow, job, err).await,
        }
    }

    async fn handle_stage_success(
        &self,
        mut workflow: Workflow,
        job: Job,
        outcome: StageOutcome,
    ) -> Result<Option<Job>, WorkflowError> {
        let now = Utc::now();
        workflow.complete_stage(job.stage, now);

        let po_id = outcome.purchase_order_id.clone();
        if po_id.is_some() {
            workflow.purchase_order_id = po_id.clone();
        }

        let next_stage = job.stage.next();

        if next_stage.is_none() {
            workflow.complete_workflow(now);
        }
        self.repo.update(&workflow).await?;

        let event = poflow_domain::ProgressEvent::new(
            poflow_domain::ProgressEventType::Stage,
            workflow.id.clone(),
            job.stage,
            workflow.progress_percent,
            now,
        );
        let channel = poflow_domain::channel_name(&job.merchant_id, poflow_domain::ProgressEventType::Stage);
        self.progress.publish(&channel, event).await;

        let Some(next_stage) = next_stage else {
            let completion = poflow_domain::ProgressEvent::new(
                poflow_domain::ProgressEventType::Completion,
                workflow.id.clone(),
                job.stage,
                100,
                now,
            );
            let channel =
                poflow_domain::channel_name(&job.merchant_id, poflow_domain::ProgressEventType::Completion);
            self.progress.publish(&channel, completion).await;
            return Ok(None);
        };

        let next_job = Job {
            workflow_id: job.workflow_id,
            merchant_id: job.merchant_id,
            upload_id: job.upload_id,
            purchase_order_id: po_id.or(workflow.purchase_order_id.clone()),
            stage: next_stage,
            data: outcome.next_stage_data,
            mode: job.mode,
            attempt: 1,
        };

        match next_job.mode {
            ExecutionMode::Queued => {
                self.queue
                    .enqueue(QueueJob {
                        workflow_id: next_job.workflow_id,
                        merchant_id: next_job.merchant_id,
                        upload_id: next_job.upload_id,
                        purchase_order_id: next_job.purchase_order_id,
                        stage: next_job.stage,
                        data: next_job.data,
                        attempt: next_job.attempt,
                    })
                    .await;
                Ok(None)
            }
            ExecutionMode::Sequential => Ok(Some(next_job)),
        }
    }

    async fn handle_stage_failure(
        &self,
        mut workflow: Workflow,
        job: Job,
        err: WorkflowError,
    ) -> Result<Option<Job>, WorkflowError> {
        let now = Utc::now();

        match err.classify() {
            ErrorClass::Retryable if job.attempt < err.retry_ceiling() => {
                warn!(
                    "stage {:?} for workflow {} failed (attempt {}/{}), retrying: {}",
                    job.stage,
                    job.workflow_id,
                    job.attempt,
                    err.retry_ceiling(),
                    err
                );
                let retry_job = Job { attempt: job.attempt + 1, ..job };

                return match retry_job.mode {
                    ExecutionMode::Queued => {
                        self.queue
                            .enqueue(QueueJob {
                                workflow_id: retry_job.workflow_id,
                                merchant_id: retry_job.merchant_id,
                                upload_id: retry_job.upload_id,
                                purchase_order_id: retry_job.purchase_order_id,
                                stage: retry_job.stage,
                                data: retry_job.data,
                                attempt: retry_job.attempt,
                            })
                            .await;
                        Ok(None)
                    }
                    ExecutionMode::Sequential => Ok(Some(retry_job)),
                };
            }
            ErrorClass::NonFatal => {
                info!("non-fatal error in stage {:?} for workflow {}: {}", job.stage, job.workflow_id, err);
                let outcome_data = job.data.clone();
                return self
                    .handle_stage_success(
                        workflow,
                        job,
                        StageOutcome {
                            result: serde_json::json!({ "warning": err.to_string() }),
                            next_stage_data: outcome_data,
                            purchase_order_id: None,
                        },
                    )
                    .await;
            }
            _ => {
                warn!("terminal error in stage {:?} for workflow {}: {}", job.stage, job.workflow_id, err);
                workflow.fail_workflow(job.stage, err.to_string(), now);
                self.repo.update(&workflow).await?;

                let event = poflow_domain::ProgressEvent::new(
                    poflow_domain::ProgressEventType::Error,
                    workflow.id.clone(),
                    job.stage,
                    workflow.progress_percent,
                    now,
                )
                .with_message(err.to_string());
                let channel = poflow_domain::channel_name(&job.merchant_id, poflow_domain::ProgressEventType::Error);
                self.progress.publish(&channel, event).await;

                Err(err)
            }
        }
    }
}
