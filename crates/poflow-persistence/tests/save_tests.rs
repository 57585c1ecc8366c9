//! End-to-end save/conflict-suffix tests against a real database. Requires
//! `DATABASE_URL`; skips otherwise.

use std::sync::Arc;

use chrono::Utc;
use poflow_core::repo::PurchaseOrderRepository;
use poflow_domain::PurchaseOrder;
use poflow_persistence::{ConnectionManager, DbConfig, PgPurchaseOrderRepository};

async fn repo_or_skip() -> Option<PgPurchaseOrderRepository> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL not set: skipping");
        return None;
    }
    let cfg = DbConfig::from_env();
    let mgr = Arc::new(ConnectionManager::connect(cfg.url, cfg.min_connections, cfg.max_connections).await.unwrap());
    Some(PgPurchaseOrderRepository::new(mgr))
}

#[tokio::test]
async fn saving_two_pos_with_the_same_number_assigns_a_suffix() {
    let Some(repo) = repo_or_skip().await else { return };
    let now = Utc::now();

    let first = PurchaseOrder::new(format!("po_{}", uuid::Uuid::new_v4()), "m_suffix_test".into(), "PO-9001".into(), "USD".into(), 0.95, now);
    let saved_first = repo.save(first, "PO-9001", None).await.expect("first save");
    assert_eq!(saved_first.number, "PO-9001");

    let second = PurchaseOrder::new(format!("po_{}", uuid::Uuid::new_v4()), "m_suffix_test".into(), "PO-9001".into(), "USD".into(), 0.95, now);
    let saved_second = repo.save(second, "PO-9001", None).await.expect("second save");
    assert_eq!(saved_second.number, "PO-9001-1");
}

#[tokio::test]
async fn saving_a_po_whose_own_number_already_ends_in_digits_keeps_it_intact() {
    let Some(repo) = repo_or_skip().await else { return };
    let now = Utc::now();

    // "PO-1001" must not be mistaken for an already-suffixed "PO-1001-1"
    // style number and stripped back down to "PO" on retry.
    let first = PurchaseOrder::new(format!("po_{}", uuid::Uuid::new_v4()), "m_suffix_digits_test".into(), "PO-1001".into(), "USD".into(), 0.95, now);
    let saved_first = repo.save(first, "PO-1001", None).await.expect("first save");
    assert_eq!(saved_first.number, "PO-1001");

    let second = PurchaseOrder::new(format!("po_{}", uuid::Uuid::new_v4()), "m_suffix_digits_test".into(), "PO-1001".into(), "USD".into(), 0.95, now);
    let saved_second = repo.save(second, "PO-1001", None).await.expect("second save");
    assert_eq!(saved_second.number, "PO-1001-1");
}

#[tokio::test]
async fn updating_an_existing_po_keeps_its_row_and_number() {
    let Some(repo) = repo_or_skip().await else { return };
    let now = Utc::now();

    let po_id = format!("po_{}", uuid::Uuid::new_v4());
    let original = PurchaseOrder::new(po_id.clone(), "m_update_test".into(), "PO-7001".into(), "USD".into(), 0.5, now);
    let saved = repo.save(original, "PO-7001", None).await.expect("initial save");
    assert_eq!(saved.id, po_id);

    let mut resumed = saved.clone();
    resumed.confidence = 0.97;
    let updated = repo.save(resumed, "PO-7001", Some(&po_id)).await.expect("update save");

    assert_eq!(updated.id, po_id);
    assert_eq!(updated.number, "PO-7001");
    assert!((updated.confidence - 0.97).abs() < 1e-9);
}
