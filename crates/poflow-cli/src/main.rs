//! poflow-cli: a thin demonstration binary wiring the orchestrator, the six
//! stage processors, and the in-memory infra/fakes together to drive one
//! purchase-order upload through the whole pipeline. For more advanced
//! usage — a Postgres-backed run — see the root binary's `pg_demo` feature.
//!
//! Grounded on `chem-cli`'s "build an engine, run it to completion, print
//! the result" shape.

mod demo_repo;

use std::sync::Arc;

use poflow_adapters::{DraftStage, FakeArtifactStore, FakeExternalSink, FakeImageSource, FinalizeStage, ImageStage, ParseStage, SaveStage, SyncStage};
use poflow_core::orchestrator::Orchestrator;
use poflow_infra::SequentialRunner;

use demo_repo::{InMemoryPurchaseOrderRepository, InMemoryWorkflowRepository};

const DEMO_CSV: &str = "po_number,supplier_name,supplier_email,supplier_phone,supplier_website,currency,description,sku,quantity,unit_price,total_price\n\
PO-1001,Acme Supply Co,sales@acme.example,,https://acme.example,USD,Wireless Mouse,SKU-MOUSE,24,9.50,228.00\n\
PO-1001,Acme Supply Co,sales@acme.example,,https://acme.example,USD,USB-C Cable 2m,SKU-CABLE,50,3.20,160.00\n";

#[tokio::main]
async fn main() {
    env_logger::init();
    dotenvy::dotenv().ok();

    println!("poflow-cli: running one upload through the six-stage pipeline");
    println!("================================================================");

    let artifact_store = Arc::new(FakeArtifactStore::new());
    artifact_store.seed("file://demo-po.csv", DEMO_CSV.as_bytes().to_vec()).await;

    let extractor = Arc::new(poflow_adapters::FakeExtractor::new(Default::default()));
    let image_source = Arc::new(FakeImageSource::default());
    let external_sink = Arc::new(FakeExternalSink::default());

    let workflow_repo = Arc::new(InMemoryWorkflowRepository::default());
    let po_repo: Arc<InMemoryPurchaseOrderRepository> = Arc::new(InMemoryPurchaseOrderRepository::default());
    let kv_progress = poflow_infra::kv_progress::shared();
    let queue = poflow_infra::queue::shared();

    let mut orchestrator = Orchestrator::new(
        workflow_repo.clone(),
        kv_progress.clone() as Arc<dyn poflow_core::kv::WorkflowMetadataStore>,
        kv_progress.clone() as Arc<dyn poflow_core::progress_fabric::ProgressPublisher>,
        queue.clone() as Arc<dyn poflow_core::queue::Queue>,
    );

    orchestrator.register_processor(Arc::new(ParseStage::new(artifact_store, extractor)));
    orchestrator.register_processor(Arc::new(SaveStage::new(
        po_repo.clone() as Arc<dyn poflow_core::repo::PurchaseOrderRepository>,
        kv_progress.clone() as Arc<dyn poflow_core::kv::WorkflowMetadataStore>,
    )));
    orchestrator.register_processor(Arc::new(DraftStage::new(kv_progress.clone() as Arc<dyn poflow_core::kv::WorkflowMetadataStore>)));
    orchestrator.register_processor(Arc::new(ImageStage::new(image_source)));
    orchestrator.register_processor(Arc::new(SyncStage::new(external_sink)));
    orchestrator.register_processor(Arc::new(FinalizeStage::new(po_repo.clone() as Arc<dyn poflow_core::repo::PurchaseOrderRepository>)));

    let orchestrator = Arc::new(orchestrator);
    let config = poflow_infra::OrchestratorConfig::from_env();
    let runner = SequentialRunner::new(orchestrator, queue.clone() as Arc<dyn poflow_core::queue::Queue>, config.execution_budget);

    match runner
        .run("wf_demo_1".to_string(), "up_demo_1".to_string(), "merchant_demo".to_string(), serde_json::json!({ "file_url": "file://demo-po.csv" }))
        .await
    {
        Ok(summary) => {
            println!("workflow {} completed", summary.workflow_id);
            for (stage, elapsed) in &summary.stage_timings {
                println!("  {stage:?}: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
            }
            if let Some(handoff_stage) = summary.handed_off_at {
                println!("  handed off at {handoff_stage:?} (execution budget exhausted)");
            }
        }
        Err(err) => {
            println!("workflow failed: {err}");
        }
    }

    if let Some(workflow) = workflow_repo.find("wf_demo_1").await.unwrap() {
        println!();
        println!("final status: {:?}, progress {}%", workflow.status, workflow.progress_percent);
        if let Some(po_id) = &workflow.purchase_order_id {
            if let Some(po) = po_repo.find(po_id).await.unwrap() {
                println!("purchase order {} ({}): {:?}, {} line items, total {:.2} {}", po.id, po.number, po.status, po.line_items.len(), po.total_amount, po.currency);
            }
        }
    }
}
