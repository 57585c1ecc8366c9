//! poflow: Postgres-backed demonstration binary for the PO workflow
//! pipeline. Wires the same `Orchestrator` and six stage processors
//! `poflow-cli` demonstrates in-memory, but against a real database via
//! `poflow_persistence`. Gated behind the `pg_demo` feature since it needs a
//! running `DATABASE_URL` to do anything; without the feature this binary
//! just explains that and points at `poflow-cli` for a database-free run.
//!
//! Grounded on the teacher's own root-level demo binary (`chem-gl-chemflow`'s
//! root `Cargo.toml` declares its own `[[bin]] name = "main-core"`, separate
//! from `chem-cli`'s binary).

#[cfg(feature = "pg_demo")]
#[tokio::main]
async fn main() {
    pg_demo::run().await;
}

#[cfg(not(feature = "pg_demo"))]
fn main() {
    println!("poflow: built without the `pg_demo` feature.");
    println!("This binary's Postgres-backed demo needs DATABASE_URL and the `pg_demo` feature:");
    println!("  cargo run --features pg_demo");
    println!("For a database-free run, use the poflow-cli crate instead:");
    println!("  cargo run -p poflow-cli");
}

#[cfg(feature = "pg_demo")]
mod pg_demo {
    use std::sync::Arc;

    use poflow_adapters::{
        DraftStage, FakeArtifactStore, FakeExternalSink, FakeImageSource, FinalizeStage, ImageStage, ParseStage,
        SaveStage, SyncStage,
    };
    use poflow_core::kv::WorkflowMetadataStore;
    use poflow_core::orchestrator::Orchestrator;
    use poflow_core::progress_fabric::ProgressPublisher;
    use poflow_core::queue::Queue;
    use poflow_core::repo::PurchaseOrderRepository;
    use poflow_infra::SequentialRunner;
    use poflow_persistence::{ConnectionManager, DbConfig, PgPurchaseOrderRepository, PgWorkflowRepository};

    const DEMO_CSV: &str = "po_number,supplier_name,supplier_email,supplier_phone,supplier_website,currency,description,sku,quantity,unit_price,total_price\n\
    PO-2001,Northwind Traders,orders@northwind.example,,https://northwind.example,USD,Standing Desk,SKU-DESK,4,189.00,756.00\n\
    PO-2001,Northwind Traders,orders@northwind.example,,https://northwind.example,USD,Monitor Arm,SKU-ARM,8,42.50,340.00\n";

    pub async fn run() {
        env_logger::init();
        let db = DbConfig::from_env();

        println!("poflow: running one upload through the six-stage pipeline (Postgres-backed)");
        println!("=============================================================================");

        let conn_mgr = match ConnectionManager::connect(db.url, db.min_connections, db.max_connections).await {
            Ok(mgr) => Arc::new(mgr),
            Err(err) => {
                eprintln!("failed to connect to database: {err}");
                return;
            }
        };

        let workflow_repo = Arc::new(PgWorkflowRepository::new(conn_mgr.clone()));
        let po_repo: Arc<PgPurchaseOrderRepository> = Arc::new(PgPurchaseOrderRepository::new(conn_mgr.clone()));

        let artifact_store = Arc::new(FakeArtifactStore::new());
        artifact_store.seed("file://demo-po.csv", DEMO_CSV.as_bytes().to_vec()).await;
        let extractor = Arc::new(poflow_adapters::FakeExtractor::new(Default::default()));
        let image_source = Arc::new(FakeImageSource::default());
        let external_sink = Arc::new(FakeExternalSink::default());

        let kv_progress = poflow_infra::kv_progress::shared();
        let queue = poflow_infra::queue::shared();

        let mut orchestrator = Orchestrator::new(
            workflow_repo.clone(),
            kv_progress.clone() as Arc<dyn WorkflowMetadataStore>,
            kv_progress.clone() as Arc<dyn ProgressPublisher>,
            queue.clone() as Arc<dyn Queue>,
        );

        orchestrator.register_processor(Arc::new(ParseStage::new(artifact_store, extractor)));
        orchestrator.register_processor(Arc::new(SaveStage::new(
            po_repo.clone() as Arc<dyn PurchaseOrderRepository>,
            kv_progress.clone() as Arc<dyn WorkflowMetadataStore>,
        )));
        orchestrator.register_processor(Arc::new(DraftStage::new(kv_progress.clone() as Arc<dyn WorkflowMetadataStore>)));
        orchestrator.register_processor(Arc::new(ImageStage::new(image_source)));
        orchestrator.register_processor(Arc::new(SyncStage::new(external_sink)));
        orchestrator.register_processor(Arc::new(FinalizeStage::new(po_repo.clone() as Arc<dyn PurchaseOrderRepository>)));

        let orchestrator = Arc::new(orchestrator);
        let config = poflow_infra::OrchestratorConfig::from_env();
        let runner = SequentialRunner::new(orchestrator, queue.clone() as Arc<dyn Queue>, config.execution_budget);

        let workflow_id = format!("wf_{}", uuid::Uuid::new_v4());
        match runner
            .run(workflow_id.clone(), "up_pg_demo".to_string(), "merchant_pg_demo".to_string(), serde_json::json!({ "file_url": "file://demo-po.csv" }))
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
                return;
            }
        }

        if let Ok(Some(po_id)) = lookup_purchase_order_id(&workflow_repo, &workflow_id).await {
            if let Ok(Some(po)) = po_repo.find(&po_id).await {
                println!(
                    "purchase order {} ({}): {:?}, {} line items, total {:.2} {}",
                    po.id, po.number, po.status, po.line_items.len(), po.total_amount, po.currency
                );
            }
        }
    }

    async fn lookup_purchase_order_id(
        workflow_repo: &Arc<PgWorkflowRepository>,
        workflow_id: &str,
    ) -> Result<Option<String>, poflow_core::errors::WorkflowError> {
        use poflow_core::repo::WorkflowRepository;
        Ok(workflow_repo.find(workflow_id).await?.and_then(|w| w.purchase_order_id))
    }
}
