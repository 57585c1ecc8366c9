//! The Sequential Runner (C6, spec §4.6): drives a workflow's stages
//! back-to-back in one task instead of round-tripping through the queue,
//! subject to a wall-clock budget. `Orchestrator::run_stage` already
//! returns "what to run next" for `ExecutionMode::Sequential`
//! (`Ok(Some(next_job))`); this is the loop that keeps calling it until the
//! workflow finishes, its budget runs out, or a stage fails.
//!
//! Grounded on `chem_cli::main`'s `run_to_completion` loop shape — drive a
//! single in-process engine call repeatedly until it reports nothing left to
//! do — generalized with the budget handoff the teacher's synchronous,
//! single-shot CLI never needed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use poflow_domain::StageTag;
use serde_json::Value;

use poflow_core::errors::WorkflowError;
use poflow_core::orchestrator::Orchestrator;
use poflow_core::queue::{Queue, QueueJob};
use poflow_core::stage::{ExecutionMode, Job};

/// Per-stage wall-clock record plus whether the run finished in-process or
/// handed off the remainder to queue dispatch (spec §4.6: "if the budget
/// would be exceeded, enqueue the remaining stage instead of running it").
#[derive(Debug, Clone)]
pub struct SequentialRunSummary {
    pub workflow_id: String,
    pub stage_timings: Vec<(StageTag, Duration)>,
    pub handed_off_at: Option<StageTag>,
}

pub struct SequentialRunner {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<dyn Queue>,
    execution_budget: Duration,
}

impl SequentialRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, queue: Arc<dyn Queue>, execution_budget: Duration) -> Self {
        Self { orchestrator, queue, execution_budget }
    }

    /// Starts `workflow_id` in Sequential mode and drives it stage by stage.
    /// `start_workflow` itself never runs a stage for this mode (that's the
    /// orchestrator's contract, spec §4.2) — the first `Job` is built here.
    pub async fn run(
        &self,
        workflow_id: String,
        upload_id: String,
        merchant_id: String,
        initial_data: Value,
    ) -> Result<SequentialRunSummary, WorkflowError> {
        self.orchestrator
            .start_workflow(workflow_id.clone(), upload_id.clone(), merchant_id.clone(), ExecutionMode::Sequential, initial_data.clone())
            .await?;

        let mut job = Job {
            workflow_id: workflow_id.clone(),
            merchant_id,
            upload_id,
            purchase_order_id: None,
            stage: StageTag::ORDER[0],
            data: initial_data,
            mode: ExecutionMode::Sequential,
            attempt: 1,
        };

        let started = Instant::now();
        let mut stage_timings = Vec::new();

        loop {
            let stage = job.stage;
            let remaining = self.execution_budget.checked_sub(started.elapsed()).unwrap_or(Duration::ZERO);
            let estimate = Duration::from_millis(stage.budget_ms());

            if remaining < estimate {
                info!(
                    "workflow {workflow_id} handing off at {:?}: {}ms remaining, stage budget {}ms",
                    stage,
                    remaining.as_millis(),
                    estimate.as_millis()
                );
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
                return Ok(SequentialRunSummary { workflow_id, stage_timings, handed_off_at: Some(stage) });
            }

            let stage_started = Instant::now();
            let next = match self.orchestrator.run_stage(job).await {
                Ok(next) => next,
                Err(err) => {
                    warn!("workflow {workflow_id} sequential run failed at {:?}: {err}", stage);
                    return Err(err);
                }
            };
            stage_timings.push((stage, stage_started.elapsed()));

            match next {
                Some(next_job) => job = next_job,
                None => return Ok(SequentialRunSummary { workflow_id, stage_timings, handed_off_at: None }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use poflow_core::kv::WorkflowMetadataStore;
    use poflow_core::progress_fabric::ProgressPublisher;
    use poflow_core::repo::WorkflowRepository;
    use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};
    use poflow_domain::Workflow;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct EchoProcessor(StageTag);

    #[async_trait]
    impl StageProcessor for EchoProcessor {
        fn stage(&self) -> StageTag {
            self.0
        }
        async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
            Ok(StageOutcome { result: serde_json::json!({}), next_stage_data: ctx.job.data.clone(), purchase_order_id: None })
        }
    }

    struct MemRepo {
        rows: Mutex<HashMap<String, Workflow>>,
    }

    #[async_trait]
    impl WorkflowRepository for MemRepo {
        async fn insert(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
            self.rows.lock().unwrap().insert(workflow.id.clone(), workflow.clone());
            Ok(())
        }
        async fn update(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
            self.rows.lock().unwrap().insert(workflow.id.clone(), workflow.clone());
            Ok(())
        }
        async fn find(&self, workflow_id: &str) -> Result<Option<Workflow>, WorkflowError> {
            Ok(self.rows.lock().unwrap().get(workflow_id).cloned())
        }
        async fn find_by_upload(&self, _upload_id: &str) -> Result<Option<Workflow>, WorkflowError> {
            Ok(None)
        }
        async fn find_stuck(&self, _older_than: chrono::DateTime<chrono::Utc>) -> Result<Vec<Workflow>, WorkflowError> {
            Ok(vec![])
        }
        async fn find_pending(&self) -> Result<Vec<Workflow>, WorkflowError> {
            Ok(vec![])
        }
    }

    struct NullKv;
    #[async_trait]
    impl WorkflowMetadataStore for NullKv {
        async fn put(&self, _key: &str, _value: Value, _ttl: Duration) {}
        async fn get(&self, _key: &str) -> Option<Value> {
            None
        }
        async fn delete(&self, _key: &str) {}
        async fn set_if_absent(&self, _key: &str, _value: Value, _ttl: Duration) -> bool {
            true
        }
    }

    struct NullProgress;
    #[async_trait]
    impl ProgressPublisher for NullProgress {
        async fn publish(&self, _channel: &str, _event: poflow_domain::ProgressEvent) {}
        async fn subscribe(&self, _channels: &[String]) -> mpsc::Receiver<poflow_domain::ProgressEvent> {
            mpsc::channel(1).1
        }
    }

    #[tokio::test]
    async fn runs_every_stage_to_completion_when_budget_is_generous() {
        let queue = crate::queue::shared();
        let mut orchestrator =
            Orchestrator::new(Arc::new(MemRepo { rows: Mutex::new(HashMap::new()) }), Arc::new(NullKv), Arc::new(NullProgress), queue.clone());
        for stage in StageTag::ORDER {
            orchestrator.register_processor(Arc::new(EchoProcessor(stage)));
        }
        let orchestrator = Arc::new(orchestrator);

        let runner = SequentialRunner::new(orchestrator, queue.clone(), Duration::from_secs(3600));
        let summary = runner
            .run("wf_1".into(), "up_1".into(), "m_1".into(), serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(summary.stage_timings.len(), StageTag::ORDER.len());
        assert!(summary.handed_off_at.is_none());
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn hands_off_to_queue_when_budget_is_exhausted() {
        let queue = crate::queue::shared();
        let mut orchestrator =
            Orchestrator::new(Arc::new(MemRepo { rows: Mutex::new(HashMap::new()) }), Arc::new(NullKv), Arc::new(NullProgress), queue.clone());
        for stage in StageTag::ORDER {
            orchestrator.register_processor(Arc::new(EchoProcessor(stage)));
        }
        let orchestrator = Arc::new(orchestrator);

        let runner = SequentialRunner::new(orchestrator, queue.clone(), Duration::from_millis(1));
        let summary = runner
            .run("wf_1".into(), "up_1".into(), "m_1".into(), serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(summary.handed_off_at, Some(StageTag::AiParsing));
        assert_eq!(queue.len().await, 1);
    }
}
