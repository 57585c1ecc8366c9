//! Repository seams (C2/C3's consumer-facing contracts).
//!
//! `WorkflowRepository` plays the role `chem_core::repo::FlowRepository`
//! plays for the teacher, minus event replay: a `Workflow` here is a mutable
//! aggregate row, not a materialized view over an append-only log, so the
//! contract is plain CRUD plus the two read patterns the orchestrator and
//! janitor need.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poflow_domain::{FuzzyEngine, ParsedSupplier, PurchaseOrder, Workflow};

use crate::errors::WorkflowError;

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn insert(&self, workflow: &Workflow) -> Result<(), WorkflowError>;
    async fn update(&self, workflow: &Workflow) -> Result<(), WorkflowError>;
    async fn find(&self, workflow_id: &str) -> Result<Option<Workflow>, WorkflowError>;
    async fn find_by_upload(&self, upload_id: &str) -> Result<Option<Workflow>, WorkflowError>;

    /// Workflows whose `updated_at` predates the janitor's staleness
    /// threshold and are not in a terminal status (spec §4.8).
    async fn find_stuck(&self, older_than: DateTime<Utc>) -> Result<Vec<Workflow>, WorkflowError>;

    /// Non-terminal workflows awaiting tick-driven dispatch (spec §4.9).
    async fn find_pending(&self) -> Result<Vec<Workflow>, WorkflowError>;
}

/// Persistence-service contract (C3) the `database_save` stage depends on.
/// Kept separate from `WorkflowRepository` because it owns the
/// conflict-resolution + supplier-matching transaction, not simple CRUD.
#[async_trait]
pub trait PurchaseOrderRepository: Send + Sync {
    /// Runs the transactional half of the save (spec §4.3.1). `po.number` is
    /// already the pre-transaction-suggested candidate (from the pre-check);
    /// `base_number` is the stable, un-suffixed PO number the in-transaction
    /// suffix retry restarts from on a unique-constraint collision — it is
    /// threaded through explicitly rather than re-derived from `po.number`,
    /// since a caller-supplied number can itself contain a numeric segment
    /// that looks like a suffix.
    ///
    /// `existing_po_id` is `None` for a first-time insert (steps 3-6) and
    /// `Some(id)` for the update path: the same structure, but writing to an
    /// already-existing row, and a number collision on the fallback attempt
    /// drops the `number` field from the update and retries without
    /// changing it rather than searching for a new suffix.
    ///
    /// Supplier resolution and the PO-number pre-check (steps 1-2) run
    /// before this is called — they are not part of the transaction.
    async fn save(
        &self,
        po: PurchaseOrder,
        base_number: &str,
        existing_po_id: Option<&str>,
    ) -> Result<PurchaseOrder, WorkflowError>;

    async fn find(&self, po_id: &str) -> Result<Option<PurchaseOrder>, WorkflowError>;

    /// Pre-transaction supplier resolution (spec §4.3.1 step 1): fuzzy match
    /// against the merchant's existing suppliers with the given engine,
    /// creating a new row only if nothing clears the match threshold.
    /// Returns the resolved supplier id.
    async fn resolve_supplier(
        &self,
        merchant_id: &str,
        parsed: &ParsedSupplier,
        engine: FuzzyEngine,
    ) -> Result<String, WorkflowError>;

    /// PO-number pre-check (spec §4.3.1 step 2): the lowest unused `base-k`
    /// suffix for `base`, or `base` itself if free. Run outside any
    /// transaction; `save`'s in-transaction retry is the race-condition
    /// safety net if the suggested number gets taken between this call and
    /// the insert.
    async fn precheck_suggested_number(&self, merchant_id: &str, base: &str) -> Result<String, WorkflowError>;

    /// Single-row status update (spec S6 "Updates PO status based on
    /// confidence thresholds"). Deliberately its own statement rather than a
    /// full `save`, which only ever inserts — the finalize stage never
    /// touches line items.
    async fn update_status(
        &self,
        po_id: &str,
        status: poflow_domain::PoStatus,
        processing_notes: Option<String>,
    ) -> Result<(), WorkflowError>;

    /// Purchase orders whose line items committed but whose workflow never
    /// reached `status_update` (spec §4.7 Janitor, second bullet): `status`
    /// still `pending`/`processing` past `older_than`. The janitor finalizes
    /// these directly with S6 semantics rather than waiting on a workflow
    /// that may never resume.
    async fn find_orphaned(&self, older_than: DateTime<Utc>) -> Result<Vec<PurchaseOrder>, WorkflowError>;
}
