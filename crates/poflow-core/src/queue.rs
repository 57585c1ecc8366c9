//! Trait seam for the stage-dispatch queue used by Queued-mode workflows
//! (spec §4.6, §4.9 Tick Dispatcher).

use async_trait::async_trait;
use poflow_domain::StageTag;
use serde_json::Value;

/// A single queued unit of work: one stage of one workflow.
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub workflow_id: String,
    pub merchant_id: String,
    pub upload_id: String,
    pub purchase_order_id: Option<String>,
    pub stage: StageTag,
    pub data: Value,
    pub attempt: u32,
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, job: QueueJob);

    /// Non-blocking pop; `None` if the queue is empty right now.
    async fn try_dequeue(&self) -> Option<QueueJob>;

    /// Approximate depth, used by the tick dispatcher's backlog checks.
    async fn len(&self) -> usize;
}
