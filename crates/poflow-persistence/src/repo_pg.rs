//! `PgWorkflowRepository`: the Postgres-backed `WorkflowRepository`.
//!
//! Plays the role `chem_persistence::pg::PgFlowRepository` plays for the
//! teacher, minus event replay — there's no `InMemoryFlowRepository` to
//! delegate to, since a `Workflow` here is a row the repository reads and
//! writes directly rather than a view folded from an event log.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use poflow_core::repo::WorkflowRepository;
use poflow_core::WorkflowError;
use poflow_domain::{StageRecord, StageTag, Workflow, WorkflowStatus};

use crate::conn::ConnectionManager;
use crate::schema::workflows;

pub struct PgWorkflowRepository {
    conn_mgr: Arc<ConnectionManager>,
}

impl PgWorkflowRepository {
    pub fn new(conn_mgr: Arc<ConnectionManager>) -> Self {
        Self { conn_mgr }
    }
}

#[derive(Queryable)]
struct WorkflowRow {
    id: String,
    upload_id: String,
    merchant_id: String,
    status: String,
    current_stage: Option<String>,
    progress_percent: i16,
    stages: serde_json::Value,
    purchase_order_id: Option<String>,
    error_message: Option<String>,
    failed_stage: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRow {
    fn into_domain(self) -> Result<Workflow, WorkflowError> {
        let status = status_from_wire(&self.status);
        let stages: BTreeMap<StageTag, StageRecord> =
            serde_json::from_value(self.stages).map_err(|e| WorkflowError::Internal(format!("stages deserialize: {e}")))?;
        Ok(Workflow {
            id: self.id,
            upload_id: self.upload_id,
            merchant_id: self.merchant_id,
            status,
            current_stage: self.current_stage.and_then(|s| StageTag::from_wire_name(&s)),
            progress_percent: self.progress_percent.max(0) as u8,
            stages,
            purchase_order_id: self.purchase_order_id,
            error_message: self.error_message,
            failed_stage: self.failed_stage.and_then(|s| StageTag::from_wire_name(&s)),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

fn status_wire(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Pending => "pending",
        WorkflowStatus::Processing => "processing",
        WorkflowStatus::Completed => "completed",
        WorkflowStatus::Failed => "failed",
    }
}

fn status_from_wire(s: &str) -> WorkflowStatus {
    match s {
        "processing" => WorkflowStatus::Processing,
        "completed" => WorkflowStatus::Completed,
        "failed" => WorkflowStatus::Failed,
        _ => WorkflowStatus::Pending,
    }
}

fn to_row_values(wf: &Workflow) -> Result<serde_json::Value, WorkflowError> {
    serde_json::to_value(&wf.stages).map_err(|e| WorkflowError::Internal(format!("stages serialize: {e}")))
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn insert(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        let stages_json = to_row_values(workflow)?;
        let wf = workflow.clone();
        self.conn_mgr
            .with_retry(move |conn| {
                diesel::insert_into(workflows::table)
                    .values((
                        workflows::id.eq(&wf.id),
                        workflows::upload_id.eq(&wf.upload_id),
                        workflows::merchant_id.eq(&wf.merchant_id),
                        workflows::status.eq(status_wire(wf.status)),
                        workflows::current_stage.eq(wf.current_stage.map(|s| s.wire_name())),
                        workflows::progress_percent.eq(wf.progress_percent as i16),
                        workflows::stages.eq(&stages_json),
                        workflows::purchase_order_id.eq(&wf.purchase_order_id),
                        workflows::error_message.eq(&wf.error_message),
                        workflows::failed_stage.eq(wf.failed_stage.map(|s| s.wire_name())),
                        workflows::created_at.eq(wf.created_at),
                        workflows::updated_at.eq(wf.updated_at),
                        workflows::completed_at.eq(wf.completed_at),
                    ))
                    .execute(conn)
                    .map(|_| ())
                    .map_err(crate::error::from_diesel)
            })
            .await
    }

    async fn update(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        let stages_json = to_row_values(workflow)?;
        let wf = workflow.clone();
        self.conn_mgr
            .with_retry(move |conn| {
                diesel::update(workflows::table.find(&wf.id))
                    .set((
                        workflows::status.eq(status_wire(wf.status)),
                        workflows::current_stage.eq(wf.current_stage.map(|s| s.wire_name())),
                        workflows::progress_percent.eq(wf.progress_percent as i16),
                        workflows::stages.eq(&stages_json),
                        workflows::purchase_order_id.eq(&wf.purchase_order_id),
                        workflows::error_message.eq(&wf.error_message),
                        workflows::failed_stage.eq(wf.failed_stage.map(|s| s.wire_name())),
                        workflows::updated_at.eq(wf.updated_at),
                        workflows::completed_at.eq(wf.completed_at),
                    ))
                    .execute(conn)
                    .map(|_| ())
                    .map_err(crate::error::from_diesel)
            })
            .await
    }

    async fn find(&self, workflow_id: &str) -> Result<Option<Workflow>, WorkflowError> {
        let workflow_id = workflow_id.to_string();
        let row: Option<WorkflowRow> = self
            .conn_mgr
            .with_retry(move |conn| {
                workflows::table.find(&workflow_id).first::<WorkflowRow>(conn).optional().map_err(crate::error::from_diesel)
            })
            .await?;
        row.map(WorkflowRow::into_domain).transpose()
    }

    async fn find_by_upload(&self, upload_id: &str) -> Result<Option<Workflow>, WorkflowError> {
        let upload_id = upload_id.to_string();
        let row: Option<WorkflowRow> = self
            .conn_mgr
            .with_retry(move |conn| {
                workflows::table
                    .filter(workflows::upload_id.eq(&upload_id))
                    .first::<WorkflowRow>(conn)
                    .optional()
                    .map_err(crate::error::from_diesel)
            })
            .await?;
        row.map(WorkflowRow::into_domain).transpose()
    }

    /// Locks with `FOR UPDATE SKIP LOCKED` (spec §4.8): a janitor scan races
    /// live stage processing for the same rows, and must skip whatever a
    /// live attempt already holds rather than block behind it.
    async fn find_stuck(&self, older_than: DateTime<Utc>) -> Result<Vec<Workflow>, WorkflowError> {
        let rows: Vec<WorkflowRow> = self
            .conn_mgr
            .with_retry(move |conn| {
                workflows::table
                    .filter(workflows::updated_at.lt(older_than))
                    .filter(workflows::status.eq_any(["pending", "processing"]))
                    .for_update()
                    .skip_locked()
                    .load::<WorkflowRow>(conn)
                    .map_err(crate::error::from_diesel)
            })
            .await?;
        rows.into_iter().map(WorkflowRow::into_domain).collect()
    }

    async fn find_pending(&self) -> Result<Vec<Workflow>, WorkflowError> {
        let rows: Vec<WorkflowRow> = self
            .conn_mgr
            .with_retry(move |conn| {
                workflows::table
                    .filter(workflows::status.eq_any(["pending", "processing"]))
                    .load::<WorkflowRow>(conn)
                    .map_err(crate::error::from_diesel)
            })
            .await?;
        rows.into_iter().map(WorkflowRow::into_domain).collect()
    }
}
