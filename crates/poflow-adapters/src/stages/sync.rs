//! S5 — Sync (tag `shopify_sync`, budget 60 s, best-effort/non-fatal).
//!
//! Transforms drafts into the `ExternalSink` payload schema and submits
//! each one independently; a submission failure is logged and counted but
//! never fails the workflow (spec S5: "retryable via a separate manual
//! action").

use std::sync::Arc;

use async_trait::async_trait;
use poflow_domain::{DraftStatus, StageTag};
use serde::{Deserialize, Serialize};

use poflow_core::errors::WorkflowError;
use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};

use super::publish_progress;
use crate::external_sink::{ExternalSink, SyncPayload};
use crate::stages::images::ImagesOutput;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutput {
    pub purchase_order_id: String,
    pub drafts: Vec<poflow_domain::ProductDraft>,
    pub synced: usize,
    pub failed: usize,
}

pub struct SyncStage {
    sink: Arc<dyn ExternalSink>,
}

impl SyncStage {
    pub fn new(sink: Arc<dyn ExternalSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl StageProcessor for SyncStage {
    fn stage(&self) -> StageTag {
        StageTag::ShopifySync
    }

    async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
        publish_progress(ctx, StageTag::ShopifySync, 5, "starting").await;

        let job = ctx.job;
        let input: ImagesOutput =
            serde_json::from_value(job.data.clone()).map_err(|e| WorkflowError::Internal(format!("sync stage: {e}")))?;

        let total = input.drafts.len().max(1);
        let mut drafts = Vec::with_capacity(input.drafts.len());
        let mut synced = 0usize;
        let mut failed = 0usize;

        for (i, mut draft) in input.drafts.into_iter().enumerate() {
            let payload = SyncPayload {
                draft_id: draft.id.clone(),
                title: draft.refined_title.clone().unwrap_or_else(|| draft.original_title.clone()),
                price: draft.price_refined.unwrap_or(draft.original_price),
                image_urls: draft.images.iter().map(|img| img.url.clone()).collect(),
            };

            match self.sink.submit(payload).await {
                Ok(()) => {
                    draft.status = DraftStatus::Synced;
                    synced += 1;
                }
                Err(e) => {
                    log::warn!("workflow {} sync failed for draft {}: {e}", job.workflow_id, draft.id);
                    failed += 1;
                }
            }

            drafts.push(draft);
            let percent = 5 + ((i + 1) * 90 / total) as u8;
            publish_progress(ctx, StageTag::ShopifySync, percent.min(95), "synced").await;
        }

        let output = SyncOutput { purchase_order_id: input.purchase_order_id.clone(), drafts, synced, failed };
        let next_stage_data = serde_json::to_value(&output).map_err(|e| WorkflowError::Internal(e.to_string()))?;

        Ok(StageOutcome {
            result: serde_json::json!({ "synced": output.synced, "failed": output.failed }),
            next_stage_data,
            purchase_order_id: Some(output.purchase_order_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use poflow_domain::ProductDraft;

    struct NullProgress;
    #[async_trait]
    impl poflow_core::progress_fabric::ProgressPublisher for NullProgress {
        async fn publish(&self, _channel: &str, _event: poflow_domain::ProgressEvent) {}
        async fn subscribe(&self, _channels: &[String]) -> tokio::sync::mpsc::Receiver<poflow_domain::ProgressEvent> {
            tokio::sync::mpsc::channel(1).1
        }
    }

    fn job_with(data: serde_json::Value) -> poflow_core::stage::Job {
        poflow_core::stage::Job {
            workflow_id: "wf_1".into(),
            merchant_id: "m_1".into(),
            upload_id: "up_1".into(),
            purchase_order_id: Some("po_1".into()),
            stage: StageTag::ShopifySync,
            data,
            mode: poflow_core::stage::ExecutionMode::Sequential,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn submits_every_draft_and_marks_it_synced() {
        let sink = Arc::new(crate::external_sink::FakeExternalSink::default());
        let stage = SyncStage::new(sink.clone());

        let draft =
            ProductDraft::new("draft_1".into(), "li_1".into(), "m_1".into(), "po_1".into(), "sess_1".into(), "Widget".into(), 10.0, Utc::now());
        let input = ImagesOutput { purchase_order_id: "po_1".into(), drafts: vec![draft], drafts_without_images: 0 };
        let job = job_with(serde_json::to_value(&input).unwrap());
        let progress = NullProgress;
        let ctx = StageContext { job: &job, progress: &progress };

        let outcome = stage.process(&ctx).await.unwrap();
        let output: SyncOutput = serde_json::from_value(outcome.next_stage_data).unwrap();
        assert_eq!(output.synced, 1);
        assert_eq!(output.failed, 0);
        assert_eq!(output.drafts[0].status, DraftStatus::Synced);
        assert_eq!(sink.submissions.lock().await.len(), 1);
    }
}
