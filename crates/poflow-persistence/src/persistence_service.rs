//! The Persistence Service (C3): the PO save transaction (spec §4.3.1) and
//! the supplier resolution step it depends on.
//!
//! Grounded in `chem_persistence::pg`'s unique-constraint handling
//! (`DatabaseErrorKind::UniqueViolation` branch in `PersistenceError::from`)
//! generalized from single-row dedup into the PO-number suffix search.
//! Diesel creates a `SAVEPOINT` for each nested `conn.transaction` call, so
//! a failed insert attempt rolls back only to the savepoint rather than the
//! whole outer transaction — exactly the "one statement at a time, retry in
//! place" shape the suffix loop needs.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::warn;
use poflow_core::repo::PurchaseOrderRepository;
use poflow_core::WorkflowError;
use poflow_domain::{FuzzyEngine, LineItem, ParsedSupplier, PurchaseOrder};

use crate::conn::ConnectionManager;
use crate::fuzzy;
use crate::schema::{line_items, purchase_orders, suppliers};

const SUFFIX_SEARCH_CEILING: u32 = 100;

pub struct PgPurchaseOrderRepository {
    conn_mgr: Arc<ConnectionManager>,
}

impl PgPurchaseOrderRepository {
    pub fn new(conn_mgr: Arc<ConnectionManager>) -> Self {
        Self { conn_mgr }
    }
}

#[async_trait]
impl PurchaseOrderRepository for PgPurchaseOrderRepository {
    async fn save(&self, po: PurchaseOrder, base_number: &str, existing_po_id: Option<&str>) -> Result<PurchaseOrder, WorkflowError> {
        // The caller (S2 stage processor) is expected to have already run
        // supplier resolution + the number precheck and baked the result
        // into `po`; `save` here owns only the transactional write +
        // retry/fallback + verification (spec §4.3.1 steps 3-6, or the
        // update path when `existing_po_id` is given).
        match existing_po_id {
            None => insert_with_suffix_retry(&self.conn_mgr, po, base_number.to_string()).await,
            Some(existing_id) => update_existing(&self.conn_mgr, po, existing_id).await,
        }
    }

    /// Pre-transaction supplier resolution (spec §4.3.1 step 1): fuzzy match
    /// first, create a new row only if nothing clears the threshold.
    async fn resolve_supplier(&self, merchant_id: &str, parsed: &ParsedSupplier, engine: FuzzyEngine) -> Result<String, WorkflowError> {
        let matched = match engine {
            FuzzyEngine::A => fuzzy::match_engine_a(&self.conn_mgr, merchant_id, parsed).await?,
            FuzzyEngine::B => fuzzy::match_engine_b(&self.conn_mgr, merchant_id, parsed).await?,
        };
        if let Some(m) = matched {
            return Ok(m.supplier.id);
        }

        let new_id = format!("sup_{}", uuid::Uuid::new_v4());
        let merchant_id = merchant_id.to_string();
        let parsed = parsed.clone();
        let insert_id = new_id.clone();
        self.conn_mgr
            .with_retry(move |conn| {
                diesel::insert_into(suppliers::table)
                    .values((
                        suppliers::id.eq(&insert_id),
                        suppliers::merchant_id.eq(&merchant_id),
                        suppliers::name.eq(&parsed.name),
                        suppliers::email.eq(&parsed.email),
                        suppliers::phone.eq(&parsed.phone),
                        suppliers::website.eq(&parsed.website),
                    ))
                    .execute(conn)
                    .map(|_| ())
                    .map_err(crate::error::from_diesel)
            })
            .await?;
        Ok(new_id)
    }

    /// PO-number pre-check (spec §4.3.1 step 2): finds the lowest unused
    /// `base-k` suffix, or `base` itself if free.
    async fn precheck_suggested_number(&self, merchant_id: &str, base: &str) -> Result<String, WorkflowError> {
        let pattern = format!("{base}%");
        let merchant_id = merchant_id.to_string();
        let base_owned = base.to_string();
        let existing: Vec<String> = self
            .conn_mgr
            .with_retry(move |conn| {
                purchase_orders::table
                    .filter(purchase_orders::merchant_id.eq(&merchant_id))
                    .filter(purchase_orders::number.like(&pattern))
                    .select(purchase_orders::number)
                    .load::<String>(conn)
                    .map_err(crate::error::from_diesel)
            })
            .await?;

        if !existing.iter().any(|n| n == base) {
            return Ok(base.to_string());
        }

        let used: HashSet<u32> = existing
            .iter()
            .filter_map(|n| n.strip_prefix(&format!("{base_owned}-")))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .collect();

        let mut k = 1u32;
        while used.contains(&k) {
            k += 1;
        }
        Ok(format!("{base_owned}-{k}"))
    }

    async fn find(&self, po_id: &str) -> Result<Option<PurchaseOrder>, WorkflowError> {
        let po_id = po_id.to_string();
        let row: Option<PoRow> = self
            .conn_mgr
            .with_retry(move |conn| {
                purchase_orders::table
                    .find(&po_id)
                    .first::<PoRow>(conn)
                    .optional()
                    .map_err(crate::error::from_diesel)
            })
            .await?;

        let Some(row) = row else { return Ok(None) };
        let po_id = row.id.clone();
        let items: Vec<LineItemRow> = self
            .conn_mgr
            .with_retry(move |conn| {
                line_items::table
                    .filter(line_items::purchase_order_id.eq(&po_id))
                    .load::<LineItemRow>(conn)
                    .map_err(crate::error::from_diesel)
            })
            .await?;

        Ok(Some(row.into_domain(items)))
    }

    async fn update_status(
        &self,
        po_id: &str,
        status: poflow_domain::PoStatus,
        processing_notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        let po_id = po_id.to_string();
        let now = Utc::now();
        self.conn_mgr
            .with_retry(move |conn| {
                diesel::update(purchase_orders::table.find(&po_id))
                    .set((
                        purchase_orders::status.eq(status_wire(status)),
                        purchase_orders::processing_notes.eq(&processing_notes),
                        purchase_orders::updated_at.eq(now),
                        purchase_orders::job_completed_at.eq(now),
                    ))
                    .execute(conn)
                    .map(|_| ())
                    .map_err(crate::error::from_diesel)
            })
            .await
    }

    /// Locks with `FOR UPDATE SKIP LOCKED` (spec §4.8), same reasoning as
    /// `find_stuck`: skip rows a live save/finalize attempt is already
    /// holding rather than block the scan behind them.
    async fn find_orphaned(&self, older_than: chrono::DateTime<Utc>) -> Result<Vec<PurchaseOrder>, WorkflowError> {
        let rows: Vec<PoRow> = self
            .conn_mgr
            .with_retry(move |conn| {
                purchase_orders::table
                    .filter(
                        purchase_orders::status
                            .eq(status_wire(poflow_domain::PoStatus::Pending))
                            .or(purchase_orders::status.eq(status_wire(poflow_domain::PoStatus::Processing))),
                    )
                    .filter(purchase_orders::updated_at.lt(older_than))
                    .for_update()
                    .skip_locked()
                    .load::<PoRow>(conn)
                    .map_err(crate::error::from_diesel)
            })
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let po_id = row.id.clone();
            let items: Vec<LineItemRow> = self
                .conn_mgr
                .with_retry(move |conn| {
                    line_items::table
                        .filter(line_items::purchase_order_id.eq(&po_id))
                        .load::<LineItemRow>(conn)
                        .map_err(crate::error::from_diesel)
                })
                .await?;
            out.push(row.into_domain(items));
        }
        Ok(out)
    }
}

/// Runs the conflict-resolution suffix loop from inside one outer Diesel
/// transaction budgeted to the spec's 10s ceiling, then verifies the
/// committed line-item count (spec §4.3.1 step 6). `base` is the caller's
/// stable, un-suffixed PO number — not re-derived from `po.number`, since a
/// collision restarts the suffix search from the same base regardless of
/// what `po.number` (the pre-check's suggestion) happens to look like.
async fn insert_with_suffix_retry(conn_mgr: &ConnectionManager, po: PurchaseOrder, base: String) -> Result<PurchaseOrder, WorkflowError> {
    let pool = conn_mgr.get_client().await?;
    let expected_items = po.line_items.len() as i64;
    let po_for_task = po.clone();

    let final_number = tokio::task::spawn_blocking(move || -> Result<String, WorkflowError> {
        let mut conn = pool.get().map_err(|e| WorkflowError::TransientConnection(format!("pool get: {e}")))?;
        conn.transaction(|conn| -> Result<String, DieselError> {
            conn.batch_execute("SET LOCAL statement_timeout = '10s'")?;
            let number = insert_po_with_retry(conn, &po_for_task, &base)?;
            insert_line_items(conn, &po_for_task, &number)?;
            Ok(number)
        })
        .map_err(crate::error::from_diesel)
    })
    .await
    .map_err(|e| WorkflowError::Internal(format!("save task panicked: {e}")))??;

    // Post-commit verification (spec §4.3.1 step 6).
    let pool = conn_mgr.get_client().await?;
    let po_id = po.id.clone();
    let actual: i64 = tokio::task::spawn_blocking(move || -> Result<i64, WorkflowError> {
        let mut conn = pool.get().map_err(|e| WorkflowError::TransientConnection(format!("pool get: {e}")))?;
        line_items::table
            .filter(line_items::purchase_order_id.eq(&po_id))
            .count()
            .get_result(&mut conn)
            .map_err(crate::error::from_diesel)
    })
    .await
    .map_err(|e| WorkflowError::Internal(format!("verify task panicked: {e}")))??;

    if actual < expected_items {
        return Err(WorkflowError::SaveFailed(format!(
            "post-commit verification failed: expected {expected_items} line items, found {actual}"
        )));
    }

    let mut saved = po;
    saved.number = final_number;
    Ok(saved)
}

/// Update path (spec §4.3.1 "Update path"): same shape as the insert path,
/// but writes `existing_po_id`'s row instead of inserting a new one, and a
/// number collision on the fallback attempt drops the `number` field from
/// the update and retries without changing it rather than searching for a
/// new suffix (there is no `base` to search suffixes against — the row
/// already has a number).
async fn update_existing(conn_mgr: &ConnectionManager, po: PurchaseOrder, existing_po_id: &str) -> Result<PurchaseOrder, WorkflowError> {
    let pool = conn_mgr.get_client().await?;
    let expected_items = po.line_items.len() as i64;
    let po_for_task = po.clone();
    let existing_id = existing_po_id.to_string();

    let final_number = tokio::task::spawn_blocking(move || -> Result<String, WorkflowError> {
        let mut conn = pool.get().map_err(|e| WorkflowError::TransientConnection(format!("pool get: {e}")))?;
        conn.transaction(|conn| -> Result<String, DieselError> {
            conn.batch_execute("SET LOCAL statement_timeout = '10s'")?;
            let number = update_po_row_with_fallback(conn, &po_for_task, &existing_id)?;
            diesel::delete(line_items::table.filter(line_items::purchase_order_id.eq(&existing_id))).execute(conn)?;
            insert_line_items(conn, &po_for_task, &number)?;
            Ok(number)
        })
        .map_err(crate::error::from_diesel)
    })
    .await
    .map_err(|e| WorkflowError::Internal(format!("update task panicked: {e}")))??;

    // Post-commit verification (spec §4.3.1 step 6), same contract as insert.
    let pool = conn_mgr.get_client().await?;
    let po_id = existing_po_id.to_string();
    let actual: i64 = tokio::task::spawn_blocking(move || -> Result<i64, WorkflowError> {
        let mut conn = pool.get().map_err(|e| WorkflowError::TransientConnection(format!("pool get: {e}")))?;
        line_items::table
            .filter(line_items::purchase_order_id.eq(&po_id))
            .count()
            .get_result(&mut conn)
            .map_err(crate::error::from_diesel)
    })
    .await
    .map_err(|e| WorkflowError::Internal(format!("verify task panicked: {e}")))??;

    if actual < expected_items {
        return Err(WorkflowError::SaveFailed(format!(
            "post-commit verification failed: expected {expected_items} line items, found {actual}"
        )));
    }

    let mut saved = po;
    saved.id = existing_po_id.to_string();
    saved.number = final_number;
    Ok(saved)
}

/// Attempts the update with `po.number`; on a unique violation, re-reads the
/// row's current number and retries the same update with the number field
/// dropped, keeping whatever number the row already had.
fn update_po_row_with_fallback(conn: &mut PgConnection, po: &PurchaseOrder, existing_id: &str) -> Result<String, DieselError> {
    let attempt = conn.transaction(|conn| update_po_row(conn, po, existing_id, Some(&po.number)));
    match attempt {
        Ok(()) => Ok(po.number.clone()),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            let current: String =
                purchase_orders::table.find(existing_id).select(purchase_orders::number).first(conn)?;
            conn.transaction(|conn| update_po_row(conn, po, existing_id, None))?;
            Ok(current)
        }
        Err(e) => Err(e),
    }
}

fn update_po_row(conn: &mut PgConnection, po: &PurchaseOrder, existing_id: &str, number: Option<&str>) -> Result<(), DieselError> {
    let target = diesel::update(purchase_orders::table.find(existing_id));
    let result = match number {
        Some(number) => target
            .set((
                purchase_orders::number.eq(number),
                purchase_orders::supplier_id.eq(&po.supplier_id),
                purchase_orders::status.eq(status_wire(po.status)),
                purchase_orders::confidence.eq(po.confidence),
                purchase_orders::total_amount.eq(po.total_amount),
                purchase_orders::currency.eq(&po.currency),
                purchase_orders::processing_notes.eq(&po.processing_notes),
                purchase_orders::updated_at.eq(po.updated_at),
            ))
            .execute(conn),
        None => target
            .set((
                purchase_orders::supplier_id.eq(&po.supplier_id),
                purchase_orders::status.eq(status_wire(po.status)),
                purchase_orders::confidence.eq(po.confidence),
                purchase_orders::total_amount.eq(po.total_amount),
                purchase_orders::currency.eq(&po.currency),
                purchase_orders::processing_notes.eq(&po.processing_notes),
                purchase_orders::updated_at.eq(po.updated_at),
            ))
            .execute(conn),
    };
    result.map(|_| ())
}

fn insert_po_with_retry(conn: &mut PgConnection, po: &PurchaseOrder, base: &str) -> Result<String, DieselError> {
    let attempt = conn.transaction(|conn| insert_po_row(conn, po, &po.number));
    match attempt {
        Ok(()) => return Ok(po.number.clone()),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {}
        Err(e) => return Err(e),
    }

    for k in 1..=SUFFIX_SEARCH_CEILING {
        let candidate = format!("{base}-{k}");
        match conn.transaction(|conn| insert_po_row(conn, po, &candidate)) {
            Ok(()) => return Ok(candidate),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => continue,
            Err(e) => return Err(e),
        }
    }

    warn!("suffix search exhausted {SUFFIX_SEARCH_CEILING} slots for base {base}, falling back to epoch suffix");
    let candidate = format!("{base}-{}", Utc::now().timestamp_millis());
    conn.transaction(|conn| insert_po_row(conn, po, &candidate))?;
    Ok(candidate)
}

fn insert_po_row(conn: &mut PgConnection, po: &PurchaseOrder, number: &str) -> Result<(), DieselError> {
    diesel::insert_into(purchase_orders::table)
        .values((
            purchase_orders::id.eq(&po.id),
            purchase_orders::merchant_id.eq(&po.merchant_id),
            purchase_orders::number.eq(number),
            purchase_orders::supplier_id.eq(&po.supplier_id),
            purchase_orders::status.eq(status_wire(po.status)),
            purchase_orders::confidence.eq(po.confidence),
            purchase_orders::total_amount.eq(po.total_amount),
            purchase_orders::currency.eq(&po.currency),
            purchase_orders::processing_notes.eq(&po.processing_notes),
            purchase_orders::created_at.eq(po.created_at),
            purchase_orders::updated_at.eq(po.updated_at),
            purchase_orders::job_completed_at.eq(po.job_completed_at),
        ))
        .execute(conn)
        .map(|_| ())
}

fn insert_line_items(conn: &mut PgConnection, po: &PurchaseOrder, number: &str) -> Result<(), DieselError> {
    let _ = number;
    let rows: Vec<_> = po
        .line_items
        .iter()
        .map(|li| {
            (
                line_items::id.eq(&li.id),
                line_items::purchase_order_id.eq(&po.id),
                line_items::description.eq(&li.description),
                line_items::sku.eq(&li.sku),
                line_items::quantity.eq(li.quantity),
                line_items::unit_price.eq(li.unit_price),
                line_items::total_price.eq(li.total_price),
                line_items::confidence.eq(li.confidence),
            )
        })
        .collect();
    if rows.is_empty() {
        return Ok(());
    }
    diesel::insert_into(line_items::table).values(&rows).execute(conn).map(|_| ())
}

fn status_wire(status: poflow_domain::PoStatus) -> &'static str {
    use poflow_domain::PoStatus::*;
    match status {
        Pending => "pending",
        Processing => "processing",
        ReviewNeeded => "review_needed",
        LowConfidenceReview => "low_confidence_review",
        Completed => "completed",
        Failed => "failed",
        Denied => "denied",
        Synced => "synced",
    }
}

fn status_from_wire(status: &str) -> poflow_domain::PoStatus {
    use poflow_domain::PoStatus::*;
    match status {
        "pending" => Pending,
        "processing" => Processing,
        "review_needed" => ReviewNeeded,
        "completed" => Completed,
        "failed" => Failed,
        "denied" => Denied,
        "synced" => Synced,
        _ => LowConfidenceReview,
    }
}

#[derive(Queryable)]
struct PoRow {
    id: String,
    merchant_id: String,
    number: String,
    supplier_id: Option<String>,
    status: String,
    confidence: f64,
    total_amount: f64,
    currency: String,
    processing_notes: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    job_completed_at: Option<chrono::DateTime<Utc>>,
}

impl PoRow {
    fn into_domain(self, items: Vec<LineItemRow>) -> PurchaseOrder {
        PurchaseOrder {
            id: self.id,
            merchant_id: self.merchant_id,
            number: self.number,
            supplier_id: self.supplier_id,
            status: status_from_wire(&self.status),
            confidence: self.confidence,
            total_amount: self.total_amount,
            currency: self.currency,
            line_items: items.into_iter().map(LineItemRow::into_domain).collect(),
            processing_notes: self.processing_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            job_completed_at: self.job_completed_at,
        }
    }
}

#[derive(Queryable)]
struct LineItemRow {
    id: String,
    purchase_order_id: String,
    description: String,
    sku: Option<String>,
    quantity: i64,
    unit_price: f64,
    total_price: f64,
    confidence: f64,
}

impl LineItemRow {
    fn into_domain(self) -> LineItem {
        LineItem {
            id: self.id,
            purchase_order_id: self.purchase_order_id,
            description: self.description,
            sku: self.sku,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.total_price,
            confidence: self.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_wire_form() {
        for s in [
            poflow_domain::PoStatus::Pending,
            poflow_domain::PoStatus::Processing,
            poflow_domain::PoStatus::ReviewNeeded,
            poflow_domain::PoStatus::LowConfidenceReview,
            poflow_domain::PoStatus::Completed,
            poflow_domain::PoStatus::Failed,
            poflow_domain::PoStatus::Denied,
            poflow_domain::PoStatus::Synced,
        ] {
            assert_eq!(status_from_wire(status_wire(s)), s);
        }
    }
}
