//! S2 — Save (tag `database_save`, budget 10 s).
//!
//! Wires S1's output through supplier resolution and the PO-number
//! pre-check (`PurchaseOrderRepository::resolve_supplier`/
//! `precheck_suggested_number`), builds the `PurchaseOrder` + `LineItem`s
//! with the pack-quantity rule already applied by
//! `LineItem::from_extracted`, then delegates the transactional write to
//! `PurchaseOrderRepository::save` (spec §4.3.1 steps 3-6).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use poflow_domain::{FuzzyEngine, LineItem, PurchaseOrder, StageTag};
use serde::{Deserialize, Serialize};

use poflow_core::errors::WorkflowError;
use poflow_core::kv::WorkflowMetadataStore;
use poflow_core::repo::PurchaseOrderRepository;
use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};
use poflow_policies::{EngineSelectionConfig, FuzzyEngineSelector};

use super::publish_progress;
use crate::stages::parse::ParseOutput;

/// KV TTL on the "a PO id was already minted for this attempt" marker (spec
/// §4.1 rationale: six-minute normal completion, 30x buffer). A retry of
/// this stage — same-process retry or Janitor re-enqueue — reads this back
/// to find the update path instead of minting a second PO row.
const SAVE_ATTEMPT_TTL: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SaveAttempt {
    po_id: String,
    base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveOutput {
    pub purchase_order_id: String,
    pub number: String,
    pub supplier_id: String,
    pub line_items_count: usize,
    pub confidence: f64,
    /// Carried forward for S3, which needs descriptions and prices but not
    /// the full persisted `LineItem` rows (ids/confidence are S2's concern).
    pub line_items: Vec<LineItemSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemSummary {
    pub description: String,
    pub unit_price: f64,
}

pub struct SaveStage {
    repo: Arc<dyn PurchaseOrderRepository>,
    kv: Arc<dyn WorkflowMetadataStore>,
    engine_selector: FuzzyEngineSelector,
}

impl SaveStage {
    pub fn new(repo: Arc<dyn PurchaseOrderRepository>, kv: Arc<dyn WorkflowMetadataStore>) -> Self {
        Self { repo, kv, engine_selector: FuzzyEngineSelector::new(EngineSelectionConfig::from_env()) }
    }

    pub fn with_engine_selector(
        repo: Arc<dyn PurchaseOrderRepository>,
        kv: Arc<dyn WorkflowMetadataStore>,
        engine_selector: FuzzyEngineSelector,
    ) -> Self {
        Self { repo, kv, engine_selector }
    }

    fn attempt_key(workflow_id: &str) -> String {
        format!("save-attempt:{workflow_id}")
    }
}

#[async_trait]
impl StageProcessor for SaveStage {
    fn stage(&self) -> StageTag {
        StageTag::DatabaseSave
    }

    async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
        publish_progress(ctx, StageTag::DatabaseSave, 5, "starting").await;

        let job = ctx.job;
        let parsed: ParseOutput =
            serde_json::from_value(job.data.clone()).map_err(|e| WorkflowError::Internal(format!("save stage: {e}")))?;

        publish_progress(ctx, StageTag::DatabaseSave, 30, "validating").await;

        // Pre-transaction work (spec §4.3.1 steps 1-2): neither step holds a
        // lock, so both run before the repository's transactional save.
        let engine = self.engine_selector.select(None, None, &job.merchant_id);
        let supplier_id = self.repo.resolve_supplier(&job.merchant_id, &parsed.supplier, engine).await?;

        // A retry of this stage (same-process retry or Janitor re-enqueue)
        // finds the PO id a prior attempt already minted here, so it takes
        // the update path (spec §4.3.1 "Update path") instead of inserting
        // a second row for the same upload.
        let attempt_key = Self::attempt_key(&job.workflow_id);
        let prior_attempt: Option<SaveAttempt> =
            self.kv.get(&attempt_key).await.and_then(|v| serde_json::from_value(v).ok());

        let (po_id, base, existing_po_id) = match prior_attempt {
            Some(attempt) => {
                let existing = attempt.po_id.clone();
                (attempt.po_id, attempt.base, Some(existing))
            }
            None => {
                let base = parsed.po_number.clone().unwrap_or_else(|| format!("PO-{}", &job.workflow_id));
                let po_id = format!("po_{}", uuid::Uuid::new_v4());
                self.kv
                    .put(
                        &attempt_key,
                        serde_json::to_value(&SaveAttempt { po_id: po_id.clone(), base: base.clone() }).unwrap(),
                        SAVE_ATTEMPT_TTL,
                    )
                    .await;
                (po_id, base, None)
            }
        };

        let suggested_number = self.repo.precheck_suggested_number(&job.merchant_id, &base).await?;

        let now = Utc::now();
        let mut po = PurchaseOrder::new(po_id.clone(), job.merchant_id.clone(), suggested_number, parsed.currency.clone(), parsed.confidence, now);
        po.supplier_id = Some(supplier_id.clone());

        for (i, item) in parsed.line_items.into_iter().enumerate() {
            let unit_price = item.unit_price.unwrap_or(0.0);
            let total_price = item.total_price.unwrap_or(unit_price * item.quantity.unwrap_or(1) as f64);
            let line_item = LineItem::from_extracted(
                format!("{po_id}_li{i}"),
                po_id.clone(),
                item.description,
                item.sku,
                item.quantity,
                unit_price,
                total_price,
                parsed.confidence,
            )?;
            po.line_items.push(line_item);
        }
        po.recompute_total();

        let expected_items = po.line_items.len();
        let saved = self.repo.save(po, &base, existing_po_id.as_deref()).await?;

        publish_progress(ctx, StageTag::DatabaseSave, 90, "committed").await;

        let line_items = saved
            .line_items
            .iter()
            .map(|li| LineItemSummary { description: li.description.clone(), unit_price: li.unit_price })
            .collect();

        let output = SaveOutput {
            purchase_order_id: saved.id.clone(),
            number: saved.number.clone(),
            supplier_id,
            line_items_count: expected_items,
            confidence: saved.confidence,
            line_items,
        };

        let next_stage_data = serde_json::to_value(&output).map_err(|e| WorkflowError::Internal(e.to_string()))?;

        Ok(StageOutcome {
            result: serde_json::json!({ "number": output.number, "line_items_count": output.line_items_count }),
            next_stage_data,
            purchase_order_id: Some(saved.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poflow_domain::ParsedSupplier;
    use std::sync::Mutex;

    struct RecordingRepo {
        saved: Mutex<Option<PurchaseOrder>>,
    }

    #[async_trait]
    impl PurchaseOrderRepository for RecordingRepo {
        async fn save(&self, po: PurchaseOrder, _base_number: &str, _existing_po_id: Option<&str>) -> Result<PurchaseOrder, WorkflowError> {
            *self.saved.lock().unwrap() = Some(po.clone());
            Ok(po)
        }
        async fn find(&self, _po_id: &str) -> Result<Option<PurchaseOrder>, WorkflowError> {
            Ok(self.saved.lock().unwrap().clone())
        }
        async fn resolve_supplier(&self, _merchant_id: &str, _parsed: &poflow_domain::ParsedSupplier, _engine: FuzzyEngine) -> Result<String, WorkflowError> {
            Ok("sup_1".into())
        }
        async fn precheck_suggested_number(&self, _merchant_id: &str, base: &str) -> Result<String, WorkflowError> {
            Ok(base.to_string())
        }
        async fn update_status(&self, _po_id: &str, _status: poflow_domain::PoStatus, _notes: Option<String>) -> Result<(), WorkflowError> {
            Ok(())
        }
        async fn find_orphaned(&self, _older_than: chrono::DateTime<chrono::Utc>) -> Result<Vec<PurchaseOrder>, WorkflowError> {
            Ok(vec![])
        }
    }

    fn job_with_parse_output(output: &ParseOutput) -> poflow_core::stage::Job {
        poflow_core::stage::Job {
            workflow_id: "wf_1".into(),
            merchant_id: "m_1".into(),
            upload_id: "up_1".into(),
            purchase_order_id: None,
            stage: StageTag::DatabaseSave,
            data: serde_json::to_value(output).unwrap(),
            mode: poflow_core::stage::ExecutionMode::Sequential,
            attempt: 1,
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

    /// In-memory stand-in for the KV/Progress Fabric; this crate has no
    /// dependency on the `poflow-infra` backend that implements it for real.
    #[derive(Default)]
    struct MemKv {
        entries: Mutex<std::collections::HashMap<String, serde_json::Value>>,
    }

    #[async_trait]
    impl WorkflowMetadataStore for MemKv {
        async fn put(&self, key: &str, value: serde_json::Value, _ttl: Duration) {
            self.entries.lock().unwrap().insert(key.to_string(), value);
        }
        async fn get(&self, key: &str) -> Option<serde_json::Value> {
            self.entries.lock().unwrap().get(key).cloned()
        }
        async fn delete(&self, key: &str) {
            self.entries.lock().unwrap().remove(key);
        }
        async fn set_if_absent(&self, key: &str, value: serde_json::Value, _ttl: Duration) -> bool {
            use std::collections::hash_map::Entry;
            match self.entries.lock().unwrap().entry(key.to_string()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(e) => {
                    e.insert(value);
                    true
                }
            }
        }
    }

    #[tokio::test]
    async fn builds_po_with_pack_quantity_rule_applied() {
        let output = ParseOutput {
            po_number: Some("PO-1001".into()),
            supplier: ParsedSupplier { name: "Acme Inc".into(), ..Default::default() },
            line_items: vec![crate::extractor::ExtractedLineItemData {
                description: "Case of 12 widgets".into(),
                sku: None,
                quantity: None,
                unit_price: Some(24.0),
                total_price: Some(24.0),
            }],
            currency: "USD".into(),
            confidence: 0.95,
        };
        let repo = Arc::new(RecordingRepo { saved: Mutex::new(None) });
        let kv = Arc::new(MemKv::default());
        let stage = SaveStage::new(repo.clone(), kv);
        let job = job_with_parse_output(&output);
        let progress = NullProgress;
        let ctx = StageContext { job: &job, progress: &progress };

        let outcome = stage.process(&ctx).await.unwrap();
        let saved = repo.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.line_items.len(), 1);
        assert_eq!(saved.line_items[0].quantity, 12);
        assert!((saved.line_items[0].unit_price - 2.0).abs() < 1e-9);
        assert!(outcome.purchase_order_id.is_some());
    }
}
