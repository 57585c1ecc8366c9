//! S3 — Product draft creation (tag `product_draft_creation`, budget 20 s).
//!
//! One `ProductDraft` per line item, price-refined via `poflow_policies`,
//! attached to a merchant session found (or created) through the KV store
//! (spec S3: "failure to find a session triggers creation of a temporary
//! session"). Tolerant of partial failure: only fails the stage if every
//! line item fails to draft.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use poflow_domain::{ProductDraft, Session, StageTag};
use serde::{Deserialize, Serialize};

use poflow_core::errors::WorkflowError;
use poflow_core::kv::WorkflowMetadataStore;
use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};
use poflow_policies::{refine_price, PricingConfig};

use super::publish_progress;
use crate::stages::save::SaveOutput;


/// Sessions found through the KV store are reused for an hour before a
/// fresh temporary one is minted, matching `Session::temporary`'s own TTL.
const SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftOutput {
    pub purchase_order_id: String,
    pub drafts: Vec<ProductDraft>,
    pub failed_line_items: usize,
}

pub struct DraftStage {
    kv: Arc<dyn WorkflowMetadataStore>,
    pricing: PricingConfig,
}

impl DraftStage {
    pub fn new(kv: Arc<dyn WorkflowMetadataStore>) -> Self {
        Self { kv, pricing: PricingConfig::default() }
    }

    pub fn with_pricing(kv: Arc<dyn WorkflowMetadataStore>, pricing: PricingConfig) -> Self {
        Self { kv, pricing }
    }

    async fn find_or_create_session(&self, merchant_id: &str) -> Session {
        let key = format!("session:{merchant_id}");
        let now = Utc::now();
        if let Some(value) = self.kv.get(&key).await {
            if let Ok(session) = serde_json::from_value::<Session>(value) {
                if !session.is_expired(now) {
                    return session;
                }
            }
        }
        let session = Session::temporary(format!("sess_{}", uuid::Uuid::new_v4()), merchant_id.to_string(), now);
        self.kv.put(&key, serde_json::to_value(&session).unwrap(), SESSION_TTL).await;
        session
    }
}

#[async_trait]
impl StageProcessor for DraftStage {
    fn stage(&self) -> StageTag {
        StageTag::ProductDraftCreation
    }

    async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
        publish_progress(ctx, StageTag::ProductDraftCreation, 5, "starting").await;

        let job = ctx.job;
        let saved: SaveOutput =
            serde_json::from_value(job.data.clone()).map_err(|e| WorkflowError::Internal(format!("draft stage: {e}")))?;

        let session = self.find_or_create_session(&job.merchant_id).await;
        publish_progress(ctx, StageTag::ProductDraftCreation, 20, "session ready").await;

        let line_items = saved.line_items.clone();
        let total = line_items.len().max(saved.line_items_count);
        let mut drafts = Vec::new();
        let mut failed = 0usize;
        let now = Utc::now();

        for (i, item) in line_items.into_iter().enumerate() {
            let pricing = refine_price(item.unit_price, &self.pricing);
            if pricing.refined_price <= 0.0 {
                failed += 1;
                continue;
            }
            let mut draft = ProductDraft::new(
                format!("draft_{}", uuid::Uuid::new_v4()),
                format!("{}_li{}", saved.purchase_order_id, i),
                job.merchant_id.clone(),
                saved.purchase_order_id.clone(),
                session.id.clone(),
                item.description,
                item.unit_price,
                now,
            );
            draft.price_refined = Some(pricing.refined_price);
            draft.estimated_margin = Some(pricing.estimated_margin);
            drafts.push(draft);

            let percent = 20 + ((i + 1) * 70 / total.max(1)) as u8;
            publish_progress(ctx, StageTag::ProductDraftCreation, percent.min(90), "drafted").await;
        }

        if drafts.is_empty() && total > 0 {
            return Err(WorkflowError::Internal("every line item failed to draft".into()));
        }

        let output = DraftOutput { purchase_order_id: saved.purchase_order_id.clone(), drafts, failed_line_items: failed };
        let next_stage_data = serde_json::to_value(&output).map_err(|e| WorkflowError::Internal(e.to_string()))?;

        Ok(StageOutcome {
            result: serde_json::json!({ "drafts_created": output.drafts.len(), "failed_line_items": output.failed_line_items }),
            next_stage_data,
            purchase_order_id: Some(output.purchase_order_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct InMemoryKv {
        data: Mutex<HashMap<String, serde_json::Value>>,
    }

    #[async_trait]
    impl WorkflowMetadataStore for InMemoryKv {
        async fn put(&self, key: &str, value: serde_json::Value, _ttl: Duration) {
            self.data.lock().unwrap().insert(key.to_string(), value);
        }
        async fn get(&self, key: &str) -> Option<serde_json::Value> {
            self.data.lock().unwrap().get(key).cloned()
        }
        async fn delete(&self, key: &str) {
            self.data.lock().unwrap().remove(key);
        }
        async fn set_if_absent(&self, key: &str, value: serde_json::Value, ttl: Duration) -> bool {
            let mut data = self.data.lock().unwrap();
            if data.contains_key(key) {
                false
            } else {
                data.insert(key.to_string(), value);
                let _ = ttl;
                true
            }
        }
    }

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
            stage: StageTag::ProductDraftCreation,
            data,
            mode: poflow_core::stage::ExecutionMode::Sequential,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn drafts_one_per_line_item_with_refined_price() {
        let kv = Arc::new(InMemoryKv { data: Mutex::new(HashMap::new()) });
        let stage = DraftStage::new(kv);
        let data = serde_json::json!({
            "purchase_order_id": "po_1",
            "number": "PO-1",
            "supplier_id": "sup_1",
            "line_items_count": 1,
            "confidence": 0.9,
            "line_items": [{ "description": "Widget", "unit_price": 10.0 }],
        });
        let job = job_with(data);
        let progress = NullProgress;
        let ctx = StageContext { job: &job, progress: &progress };

        let outcome = stage.process(&ctx).await.unwrap();
        let output: DraftOutput = serde_json::from_value(outcome.next_stage_data).unwrap();
        assert_eq!(output.drafts.len(), 1);
        assert!(output.drafts[0].price_refined.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn reuses_session_across_calls_for_same_merchant() {
        let kv = Arc::new(InMemoryKv { data: Mutex::new(HashMap::new()) });
        let stage = DraftStage::new(kv);
        let first = stage.find_or_create_session("m_1").await;
        let second = stage.find_or_create_session("m_1").await;
        assert_eq!(first.id, second.id);
    }
}
