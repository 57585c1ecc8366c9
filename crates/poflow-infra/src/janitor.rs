//! The Janitor (C7, spec §4.8): recovers workflows that stopped making
//! progress and finalizes purchase orders whose line items committed but
//! whose workflow never reached `status_update`.
//!
//! The "`UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED)`" shape
//! spec §4.7 describes is a Postgres locking detail `poflow_persistence`
//! owns inside `find_stuck`/`find_orphaned`'s queries, not something this
//! crate re-implements — the janitor only needs the two read contracts plus
//! the write actions (re-enqueue, fail, finalize).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use poflow_domain::{PoStatus, StageTag};

use poflow_core::errors::WorkflowError;
use poflow_core::queue::{Queue, QueueJob};
use poflow_core::repo::{PurchaseOrderRepository, WorkflowRepository};

/// Re-enqueue ceiling for a stuck workflow's current stage (spec §7
/// `WORKFLOW_STUCK`: "re-enqueues current stage (<= 3 times)"). Counted off
/// the stage's own `attempts` counter on the `Workflow` aggregate rather
/// than separate janitor-owned bookkeeping.
const STUCK_REQUEUE_CEILING: u32 = 3;

pub struct Janitor {
    workflows: Arc<dyn WorkflowRepository>,
    purchase_orders: Arc<dyn PurchaseOrderRepository>,
    queue: Arc<dyn Queue>,
    stuck_threshold: Duration,
}

#[derive(Debug, Default)]
pub struct JanitorReport {
    pub requeued: usize,
    pub failed: usize,
    pub orphans_finalized: usize,
}

impl Janitor {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        purchase_orders: Arc<dyn PurchaseOrderRepository>,
        queue: Arc<dyn Queue>,
        stuck_threshold: Duration,
    ) -> Self {
        Self { workflows, purchase_orders, queue, stuck_threshold }
    }

    pub async fn sweep(&self) -> Result<JanitorReport, WorkflowError> {
        let mut report = JanitorReport::default();
        let cutoff = Utc::now() - chrono::Duration::from_std(self.stuck_threshold).unwrap_or(chrono::Duration::seconds(600));

        for mut workflow in self.workflows.find_stuck(cutoff).await? {
            let Some(stage) = workflow.current_stage else {
                continue;
            };
            let attempts = workflow.stages.get(&stage).map(|r| r.attempts).unwrap_or(0);

            if attempts >= STUCK_REQUEUE_CEILING {
                warn!("workflow {} stuck at {:?} past the requeue ceiling, failing", workflow.id, stage);
                workflow.fail_workflow(stage, format!("stuck at {stage:?} past {STUCK_REQUEUE_CEILING} requeues"), Utc::now());
                self.workflows.update(&workflow).await?;
                report.failed += 1;
                continue;
            }

            info!("workflow {} stuck at {:?} (attempt {}/{}), re-enqueuing", workflow.id, stage, attempts, STUCK_REQUEUE_CEILING);
            // The original stage input isn't part of the durable `Workflow`
            // row (only its timestamps/status are) — recovery re-dispatches
            // with whatever the aggregate still carries rather than the
            // exact payload the crashed attempt had.
            self.queue
                .enqueue(QueueJob {
                    workflow_id: workflow.id.clone(),
                    merchant_id: workflow.merchant_id.clone(),
                    upload_id: workflow.upload_id.clone(),
                    purchase_order_id: workflow.purchase_order_id.clone(),
                    stage,
                    data: serde_json::json!({ "purchase_order_id": workflow.purchase_order_id }),
                    attempt: attempts + 1,
                })
                .await;
            report.requeued += 1;
        }

        for po in self.purchase_orders.find_orphaned(cutoff).await? {
            let status = PoStatus::from_confidence(po.confidence);
            info!("finalizing orphaned purchase order {} as {:?} (workflow never completed)", po.id, status);
            self.purchase_orders
                .update_status(&po.id, status, Some("finalized by janitor: workflow never completed".to_string()))
                .await?;
            report.orphans_finalized += 1;
        }

        Ok(report)
    }
}
