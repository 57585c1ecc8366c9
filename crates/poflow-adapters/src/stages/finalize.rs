//! S6 — Finalize (tag `status_update`, budget 5 s).
//!
//! Maps the workflow's accumulated confidence to a `PoStatus` and writes it
//! back in a single statement (spec S6). Workflow completion itself
//! (`status = completed`, `progress_percent = 100`, the `completion` event)
//! is the orchestrator's job once this stage returns — this processor only
//! owns the PO row's terminal status.

use std::sync::Arc;

use async_trait::async_trait;
use poflow_domain::{PoStatus, StageTag};
use serde::{Deserialize, Serialize};

use poflow_core::errors::WorkflowError;
use poflow_core::repo::PurchaseOrderRepository;
use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};

use super::publish_progress;
use crate::stages::sync::SyncOutput;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeOutput {
    pub purchase_order_id: String,
    pub status: PoStatus,
}

pub struct FinalizeStage {
    repo: Arc<dyn PurchaseOrderRepository>,
}

impl FinalizeStage {
    pub fn new(repo: Arc<dyn PurchaseOrderRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl StageProcessor for FinalizeStage {
    fn stage(&self) -> StageTag {
        StageTag::StatusUpdate
    }

    async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
        publish_progress(ctx, StageTag::StatusUpdate, 20, "finalizing").await;

        let job = ctx.job;
        let input: SyncOutput =
            serde_json::from_value(job.data.clone()).map_err(|e| WorkflowError::Internal(format!("finalize stage: {e}")))?;

        let po = self
            .repo
            .find(&input.purchase_order_id)
            .await?
            .ok_or_else(|| WorkflowError::Internal(format!("purchase order {} not found at finalize", input.purchase_order_id)))?;

        let status = PoStatus::from_confidence(po.confidence);
        let notes = if input.failed > 0 {
            Some(format!("{} of {} drafts failed sync", input.failed, input.synced + input.failed))
        } else {
            None
        };
        self.repo.update_status(&input.purchase_order_id, status, notes).await?;

        publish_progress(ctx, StageTag::StatusUpdate, 90, "status updated").await;

        let output = FinalizeOutput { purchase_order_id: input.purchase_order_id.clone(), status };
        let next_stage_data = serde_json::to_value(&output).map_err(|e| WorkflowError::Internal(e.to_string()))?;

        Ok(StageOutcome {
            result: serde_json::json!({ "status": output.status }),
            next_stage_data,
            purchase_order_id: Some(output.purchase_order_id),
        })
    }
}
