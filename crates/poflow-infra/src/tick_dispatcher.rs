//! The Tick Dispatcher (C8, spec §4.9): a periodic driver that discovers
//! uploads awaiting processing, starts a workflow for each, and runs the
//! Janitor. Must return well inside its own period — it only enqueues work,
//! it never runs a stage itself.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use uuid::Uuid;

use poflow_core::errors::WorkflowError;
use poflow_core::orchestrator::Orchestrator;
use poflow_core::stage::ExecutionMode;

use crate::janitor::{Janitor, JanitorReport};
use crate::upload_source::UploadSource;

#[derive(Debug, Default)]
pub struct TickReport {
    pub started: usize,
    pub duplicates_skipped: usize,
    pub janitor: JanitorReport,
}

pub struct TickDispatcher {
    orchestrator: Arc<Orchestrator>,
    uploads: Arc<dyn UploadSource>,
    janitor: Arc<Janitor>,
    /// `SEQUENTIAL_EXECUTION` (spec §6): mode newly-discovered uploads start
    /// in. The dispatcher itself always returns before any stage runs —
    /// this only decides whether the *next* call into the pipeline goes
    /// through the Sequential Runner or the queue.
    start_mode: ExecutionMode,
}

impl TickDispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>, uploads: Arc<dyn UploadSource>, janitor: Arc<Janitor>, start_mode: ExecutionMode) -> Self {
        Self { orchestrator, uploads, janitor, start_mode }
    }

    /// One tick: discover, dedup, start, then sweep. Spec §9 Open Question
    /// ("what counts as a duplicate upload when the same order is
    /// re-uploaded before parsing assigns it a PO number") is resolved here
    /// by deduping on `(merchant_id, extracted_po_number)` when the upload
    /// source supplies that hint, falling back to `upload_id` alone when it
    /// doesn't — a true PO number isn't known until S1 runs, so this is a
    /// best-effort pre-filter, not a guarantee; `start_workflow`'s own
    /// `find_by_upload` idempotency check is the hard guarantee.
    pub async fn tick(&self) -> Result<TickReport, WorkflowError> {
        let mut report = TickReport::default();
        let uploads = self.uploads.pending_uploads().await?;

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for upload in uploads {
            let dedup_key = (upload.merchant_id.clone(), upload.extracted_po_number.clone().unwrap_or_else(|| upload.upload_id.clone()));
            if !seen.insert(dedup_key) {
                report.duplicates_skipped += 1;
                continue;
            }

            let workflow_id = format!("wf_{}", Uuid::new_v4());
            let initial_data = serde_json::json!({ "file_url": upload.file_url });

            match self
                .orchestrator
                .start_workflow(workflow_id.clone(), upload.upload_id.clone(), upload.merchant_id.clone(), self.start_mode, initial_data)
                .await
            {
                Ok(workflow) => {
                    info!("tick started workflow {} for upload {}", workflow.id, upload.upload_id);
                    report.started += 1;
                }
                Err(err) => {
                    warn!("tick failed to start workflow for upload {}: {err}", upload.upload_id);
                }
            }
        }

        report.janitor = self.janitor.sweep().await?;
        Ok(report)
    }

    pub fn period(&self) -> Duration {
        // Kept for callers that want to build their own `tokio::time::interval`
        // around `tick` without re-reading config; the dispatcher doesn't
        // run its own loop so tests can call `tick` directly.
        Duration::from_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use poflow_core::kv::WorkflowMetadataStore;
    use poflow_core::progress_fabric::ProgressPublisher;
    use poflow_core::queue::{Queue, QueueJob};
    use poflow_core::repo::{PurchaseOrderRepository, WorkflowRepository};
    use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};
    use poflow_domain::{FuzzyEngine, ParsedSupplier, PurchaseOrder, StageTag, Workflow};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::upload_source::{FakeUploadSource, PendingUpload};

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
        async fn find_by_upload(&self, upload_id: &str) -> Result<Option<Workflow>, WorkflowError> {
            Ok(self.rows.lock().unwrap().values().find(|w| w.upload_id == upload_id).cloned())
        }
        async fn find_stuck(&self, _older_than: DateTime<Utc>) -> Result<Vec<Workflow>, WorkflowError> {
            Ok(vec![])
        }
        async fn find_pending(&self) -> Result<Vec<Workflow>, WorkflowError> {
            Ok(vec![])
        }
    }

    struct NullPos;
    #[async_trait]
    impl PurchaseOrderRepository for NullPos {
        async fn save(&self, po: PurchaseOrder, _base_number: &str, _existing_po_id: Option<&str>) -> Result<PurchaseOrder, WorkflowError> {
            Ok(po)
        }
        async fn find(&self, _po_id: &str) -> Result<Option<PurchaseOrder>, WorkflowError> {
            Ok(None)
        }
        async fn resolve_supplier(&self, _merchant_id: &str, _parsed: &ParsedSupplier, _engine: FuzzyEngine) -> Result<String, WorkflowError> {
            Ok("sup_1".into())
        }
        async fn precheck_suggested_number(&self, _merchant_id: &str, base: &str) -> Result<String, WorkflowError> {
            Ok(base.to_string())
        }
        async fn update_status(&self, _po_id: &str, _status: poflow_domain::PoStatus, _notes: Option<String>) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn find_orphaned(&self, _older_than: DateTime<Utc>) -> Result<Vec<PurchaseOrder>, WorkflowError> {
            Ok(vec![])
        }
    }

    struct NullKv;
    #[async_trait]
    impl WorkflowMetadataStore for NullKv {
        async fn put(&self, _key: &str, _value: Value, _ttl: std::time::Duration) {}
        async fn get(&self, _key: &str) -> Option<Value> {
            None
        }
        async fn delete(&self, _key: &str) {}
        async fn set_if_absent(&self, _key: &str, _value: Value, _ttl: std::time::Duration) -> bool {
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

    struct NullProcessor(StageTag);
    #[async_trait]
    impl StageProcessor for NullProcessor {
        fn stage(&self) -> StageTag {
            self.0
        }
        async fn process(&self, _ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
            Ok(StageOutcome { result: serde_json::json!({}), next_stage_data: serde_json::json!({}), purchase_order_id: None })
        }
    }

    fn upload(id: &str, merchant: &str) -> PendingUpload {
        PendingUpload { upload_id: id.into(), merchant_id: merchant.into(), file_url: "https://x/y.pdf".into(), extracted_po_number: None }
    }

    #[tokio::test]
    async fn starts_one_workflow_per_distinct_upload_and_sweeps() {
        let queue = crate::queue::shared();
        let mut orchestrator = Orchestrator::new(Arc::new(MemRepo { rows: Mutex::new(HashMap::new()) }), Arc::new(NullKv), Arc::new(NullProgress), queue.clone());
        for stage in StageTag::ORDER {
            orchestrator.register_processor(Arc::new(NullProcessor(stage)));
        }
        let orchestrator = Arc::new(orchestrator);

        let uploads = Arc::new(FakeUploadSource::new(vec![upload("up_1", "m_1"), upload("up_2", "m_1")]));
        let janitor = Arc::new(Janitor::new(
            Arc::new(MemRepo { rows: Mutex::new(HashMap::new()) }),
            Arc::new(NullPos),
            queue.clone(),
            std::time::Duration::from_secs(600),
        ));
        let dispatcher = TickDispatcher::new(orchestrator, uploads, janitor, ExecutionMode::Queued);

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.started, 2);
        assert_eq!(report.duplicates_skipped, 0);
    }

    #[tokio::test]
    async fn dedupes_uploads_sharing_merchant_and_po_number_hint() {
        let queue = crate::queue::shared();
        let mut orchestrator = Orchestrator::new(Arc::new(MemRepo { rows: Mutex::new(HashMap::new()) }), Arc::new(NullKv), Arc::new(NullProgress), queue.clone());
        for stage in StageTag::ORDER {
            orchestrator.register_processor(Arc::new(NullProcessor(stage)));
        }
        let orchestrator = Arc::new(orchestrator);

        let mut a = upload("up_1", "m_1");
        a.extracted_po_number = Some("PO-100".into());
        let mut b = upload("up_2", "m_1");
        b.extracted_po_number = Some("PO-100".into());
        let uploads = Arc::new(FakeUploadSource::new(vec![a, b]));
        let janitor = Arc::new(Janitor::new(
            Arc::new(MemRepo { rows: Mutex::new(HashMap::new()) }),
            Arc::new(NullPos),
            queue.clone(),
            std::time::Duration::from_secs(600),
        ));
        let dispatcher = TickDispatcher::new(orchestrator, uploads, janitor, ExecutionMode::Queued);

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.started, 1);
        assert_eq!(report.duplicates_skipped, 1);
    }
}
