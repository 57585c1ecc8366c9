//! In-memory `WorkflowRepository`/`PurchaseOrderRepository` for the demo
//! binary, grounded on `chem_core::repo::InMemoryFlowRepository`'s role as
//! the teacher's no-database reference implementation. The real,
//! Postgres-backed pair lives in `poflow_persistence`; this crate only needs
//! something that satisfies the trait so the pipeline can run end to end
//! without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poflow_core::errors::WorkflowError;
use poflow_core::repo::{PurchaseOrderRepository, WorkflowRepository};
use poflow_domain::{FuzzyEngine, ParsedSupplier, PoStatus, PurchaseOrder, Workflow};

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    rows: Mutex<HashMap<String, Workflow>>,
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
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

    async fn find_stuck(&self, older_than: DateTime<Utc>) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.updated_at < older_than && w.status != poflow_domain::WorkflowStatus::Completed && w.status != poflow_domain::WorkflowStatus::Failed)
            .cloned()
            .collect())
    }

    async fn find_pending(&self) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.status == poflow_domain::WorkflowStatus::Pending || w.status == poflow_domain::WorkflowStatus::Processing)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPurchaseOrderRepository {
    rows: Mutex<HashMap<String, PurchaseOrder>>,
}

#[async_trait]
impl PurchaseOrderRepository for InMemoryPurchaseOrderRepository {
    async fn save(&self, mut po: PurchaseOrder, base_number: &str, existing_po_id: Option<&str>) -> Result<PurchaseOrder, WorkflowError> {
        let mut rows = self.rows.lock().unwrap();

        match existing_po_id {
            None => {
                let taken = rows.values().any(|existing| existing.merchant_id == po.merchant_id && existing.number == po.number);
                if taken {
                    let mut resolved = None;
                    for suffix in 1..100 {
                        let candidate = format!("{base_number}-{suffix}");
                        if !rows.values().any(|existing| existing.merchant_id == po.merchant_id && existing.number == candidate) {
                            resolved = Some(candidate);
                            break;
                        }
                    }
                    po.number = resolved.ok_or_else(|| WorkflowError::Internal(format!("no free suffix for {base_number}")))?;
                }
                rows.insert(po.id.clone(), po.clone());
                Ok(po)
            }
            Some(existing_id) => {
                // Update path: keep the existing row's number unless the
                // caller's number is free, mirroring the fallback-drops-
                // the-number-on-collision contract without needing a retry
                // loop since there is no concurrent writer here.
                let existing_number = rows.get(existing_id).map(|p| p.number.clone());
                let taken = rows
                    .values()
                    .any(|existing| existing.id != existing_id && existing.merchant_id == po.merchant_id && existing.number == po.number);
                if taken {
                    po.number = existing_number.ok_or_else(|| WorkflowError::Internal(format!("purchase order {existing_id} not found")))?;
                }
                po.id = existing_id.to_string();
                rows.insert(po.id.clone(), po.clone());
                Ok(po)
            }
        }
    }

    async fn find(&self, po_id: &str) -> Result<Option<PurchaseOrder>, WorkflowError> {
        Ok(self.rows.lock().unwrap().get(po_id).cloned())
    }

    async fn resolve_supplier(&self, _merchant_id: &str, parsed: &ParsedSupplier, _engine: FuzzyEngine) -> Result<String, WorkflowError> {
        Ok(format!("sup_{}", parsed.name.to_lowercase().replace(' ', "_")))
    }

    async fn precheck_suggested_number(&self, merchant_id: &str, base: &str) -> Result<String, WorkflowError> {
        let rows = self.rows.lock().unwrap();
        let taken: std::collections::HashSet<&str> =
            rows.values().filter(|po| po.merchant_id == merchant_id).map(|po| po.number.as_str()).collect();
        if !taken.contains(base) {
            return Ok(base.to_string());
        }
        for suffix in 1..100 {
            let candidate = format!("{base}-{suffix}");
            if !taken.contains(candidate.as_str()) {
                return Ok(candidate);
            }
        }
        Err(WorkflowError::Internal(format!("no free suffix for {base}")))
    }

    async fn update_status(&self, po_id: &str, status: PoStatus, processing_notes: Option<String>) -> Result<(), WorkflowError> {
        let mut rows = self.rows.lock().unwrap();
        let po = rows.get_mut(po_id).ok_or_else(|| WorkflowError::Internal(format!("purchase order {po_id} not found")))?;
        po.status = status;
        po.processing_notes = processing_notes;
        po.updated_at = Utc::now();
        po.job_completed_at = Some(Utc::now());
        Ok(())
    }

    async fn find_orphaned(&self, older_than: DateTime<Utc>) -> Result<Vec<PurchaseOrder>, WorkflowError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|po| matches!(po.status, PoStatus::Pending | PoStatus::Processing) && po.updated_at < older_than)
            .cloned()
            .collect())
    }
}
