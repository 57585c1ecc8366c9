use chrono::Utc;
use poflow_domain::{LineItem, PoStatus, PurchaseOrder, StageTag, Workflow};

#[test]
fn purchase_order_total_is_sum_of_line_items() {
    let now = Utc::now();
    let mut po = PurchaseOrder::new("po1".into(), "m1".into(), "PO-1001".into(), "USD".into(), 0.95, now);
    po.line_items.push(LineItem::from_extracted("li1".into(), "po1".into(), "Widget".into(), None, Some(2), 10.0, 20.0, 0.9).unwrap());
    po.line_items.push(LineItem::from_extracted("li2".into(), "po1".into(), "Gadget".into(), None, Some(1), 5.0, 5.0, 0.9).unwrap());
    po.recompute_total();
    assert!((po.total_amount - 25.0).abs() < 1e-9);
}

#[test]
fn every_pair_of_pos_sharing_merchant_must_differ_in_number() {
    let now = Utc::now();
    let a = PurchaseOrder::new("po1".into(), "m1".into(), "PO-1001".into(), "USD".into(), 0.9, now);
    let b = PurchaseOrder::new("po2".into(), "m1".into(), "PO-1001-1".into(), "USD".into(), 0.9, now);
    assert_ne!(a.number, b.number);
}

#[test]
fn zero_line_item_po_still_finalizes_with_low_confidence() {
    let now = Utc::now();
    let po = PurchaseOrder::new("po1".into(), "m1".into(), "PO-2".into(), "USD".into(), 0.2, now);
    assert!(po.line_items.is_empty());
    assert_eq!(PoStatus::from_confidence(po.confidence), PoStatus::LowConfidenceReview);
}

#[test]
fn workflow_stage_tags_cover_all_six_in_order() {
    let now = Utc::now();
    let wf = Workflow::new("wf1".into(), "up1".into(), "m1".into(), now);
    assert_eq!(wf.stages.len(), 6);
    assert_eq!(StageTag::ORDER[0], StageTag::AiParsing);
    assert_eq!(StageTag::ORDER[5], StageTag::StatusUpdate);
}
