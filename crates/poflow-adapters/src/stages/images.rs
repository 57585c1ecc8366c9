//! S4 — Image attachment (tag `image_attachment`, budget 40 s, non-fatal).
//!
//! Per draft: detect the brand to search for, query the `ImageSource`,
//! score candidates, attach the top 3 (spec S4). Non-fatal at the
//! `StageTag` level (`ImageAttachment.is_non_fatal()`), so a per-draft
//! search failure just leaves that draft without images instead of
//! propagating.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use poflow_domain::{ProductImage, StageTag};
use serde::{Deserialize, Serialize};

use poflow_core::errors::WorkflowError;
use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};
use poflow_policies::{detect_brand, top_scored};

use super::publish_progress;
use crate::image_source::ImageSource;
use crate::stages::draft::DraftOutput;

const TOP_N_IMAGES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesOutput {
    pub purchase_order_id: String,
    pub drafts: Vec<poflow_domain::ProductDraft>,
    pub drafts_without_images: usize,
}

pub struct ImageStage {
    image_source: Arc<dyn ImageSource>,
}

impl ImageStage {
    pub fn new(image_source: Arc<dyn ImageSource>) -> Self {
        Self { image_source }
    }
}

#[async_trait]
impl StageProcessor for ImageStage {
    fn stage(&self) -> StageTag {
        StageTag::ImageAttachment
    }

    async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
        publish_progress(ctx, StageTag::ImageAttachment, 5, "starting").await;

        let job = ctx.job;
        let input: DraftOutput =
            serde_json::from_value(job.data.clone()).map_err(|e| WorkflowError::Internal(format!("images stage: {e}")))?;

        let total = input.drafts.len().max(1);
        let mut drafts = Vec::with_capacity(input.drafts.len());
        let mut without_images = 0usize;

        for (i, mut draft) in input.drafts.into_iter().enumerate() {
            let title = draft.refined_title.clone().unwrap_or_else(|| draft.original_title.clone());
            let brand = detect_brand(&title);
            let keywords: Vec<String> = title.split_whitespace().map(|w| w.to_lowercase()).collect();
            let query = format!("{brand} {title}");

            match self.image_source.search(&query).await {
                Ok(candidates) if !candidates.is_empty() => {
                    let top = top_scored(&candidates, &brand, &keywords, TOP_N_IMAGES);
                    let images = top
                        .into_iter()
                        .map(|scored| ProductImage { url: scored.url, score: scored.score, source: "image_source".to_string() })
                        .collect();
                    draft.attach_top_images(images, TOP_N_IMAGES, Utc::now());
                }
                Ok(_) => without_images += 1,
                Err(e) => {
                    log::warn!("workflow {} image search failed for draft {}: {e}", job.workflow_id, draft.id);
                    without_images += 1;
                }
            }

            drafts.push(draft);
            let percent = 5 + ((i + 1) * 90 / total) as u8;
            publish_progress(ctx, StageTag::ImageAttachment, percent.min(95), "scored").await;
        }

        let output = ImagesOutput { purchase_order_id: input.purchase_order_id.clone(), drafts, drafts_without_images: without_images };
        let next_stage_data = serde_json::to_value(&output).map_err(|e| WorkflowError::Internal(e.to_string()))?;

        Ok(StageOutcome {
            result: serde_json::json!({ "drafts_without_images": output.drafts_without_images }),
            next_stage_data,
            purchase_order_id: Some(output.purchase_order_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_source::FakeImageSource;
    use poflow_domain::ProductDraft;
    use std::collections::HashMap;

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
            stage: StageTag::ImageAttachment,
            data,
            mode: poflow_core::stage::ExecutionMode::Sequential,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn attaches_top_scored_images_to_each_draft() {
        let mut results = HashMap::new();
        results.insert(
            "Acme Acme Widget".to_string(),
            vec![poflow_policies::ImageCandidate {
                url: "https://images.cdn.acme.com/widget.jpg".into(),
                context: "Acme widget".into(),
            }],
        );
        let source = Arc::new(FakeImageSource { results });
        let stage = ImageStage::new(source);

        let draft = ProductDraft::new(
            "draft_1".into(),
            "li_1".into(),
            "m_1".into(),
            "po_1".into(),
            "sess_1".into(),
            "Acme Widget".into(),
            10.0,
            Utc::now(),
        );
        let input = DraftOutput { purchase_order_id: "po_1".into(), drafts: vec![draft], failed_line_items: 0 };
        let job = job_with(serde_json::to_value(&input).unwrap());
        let progress = NullProgress;
        let ctx = StageContext { job: &job, progress: &progress };

        let outcome = stage.process(&ctx).await.unwrap();
        let output: ImagesOutput = serde_json::from_value(outcome.next_stage_data).unwrap();
        assert_eq!(output.drafts[0].images.len(), 1);
        assert_eq!(output.drafts_without_images, 0);
    }

    #[tokio::test]
    async fn empty_search_results_leave_draft_without_images_but_do_not_fail() {
        let source = Arc::new(FakeImageSource::default());
        let stage = ImageStage::new(source);

        let draft = ProductDraft::new(
            "draft_1".into(),
            "li_1".into(),
            "m_1".into(),
            "po_1".into(),
            "sess_1".into(),
            "Obscure Gadget".into(),
            10.0,
            Utc::now(),
        );
        let input = DraftOutput { purchase_order_id: "po_1".into(), drafts: vec![draft], failed_line_items: 0 };
        let job = job_with(serde_json::to_value(&input).unwrap());
        let progress = NullProgress;
        let ctx = StageContext { job: &job, progress: &progress };

        let outcome = stage.process(&ctx).await.unwrap();
        let output: ImagesOutput = serde_json::from_value(outcome.next_stage_data).unwrap();
        assert_eq!(output.drafts_without_images, 1);
    }
}
