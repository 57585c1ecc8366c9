//! The `Workflow` aggregate: the durable record of one upload's progress
//! through the six-stage pipeline, plus the per-stage state machine it owns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// The six discrete phases of the pipeline, in their fixed declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageTag {
    AiParsing,
    DatabaseSave,
    ProductDraftCreation,
    ImageAttachment,
    ShopifySync,
    StatusUpdate,
}

impl StageTag {
    /// Canonical order in which stages execute. `S1 -> S6`.
    pub const ORDER: [StageTag; 6] = [StageTag::AiParsing,
                                       StageTag::DatabaseSave,
                                       StageTag::ProductDraftCreation,
                                       StageTag::ImageAttachment,
                                       StageTag::ShopifySync,
                                       StageTag::StatusUpdate];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).expect("stage in ORDER")
    }

    pub fn next(self) -> Option<StageTag> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    /// Non-fatal stages: failure advances the workflow instead of failing it
    /// (S4, S5 per spec §7).
    pub fn is_non_fatal(self) -> bool {
        matches!(self, StageTag::ImageAttachment | StageTag::ShopifySync)
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            StageTag::AiParsing => "ai_parsing",
            StageTag::DatabaseSave => "database_save",
            StageTag::ProductDraftCreation => "product_draft_creation",
            StageTag::ImageAttachment => "image_attachment",
            StageTag::ShopifySync => "shopify_sync",
            StageTag::StatusUpdate => "status_update",
        }
    }

    pub fn from_wire_name(s: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|t| t.wire_name() == s)
    }

    /// Soft time budget in milliseconds (§4.4 per-stage budgets).
    pub fn budget_ms(self) -> u64 {
        match self {
            StageTag::AiParsing => 90_000,
            StageTag::DatabaseSave => 10_000,
            StageTag::ProductDraftCreation => 20_000,
            StageTag::ImageAttachment => 40_000,
            StageTag::ShopifySync => 60_000,
            StageTag::StatusUpdate => 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Number of times this stage has been attempted (including the first
    /// run). Used to enforce the retry ceilings in spec §7.
    pub attempts: u32,
}

impl Default for StageRecord {
    fn default() -> Self {
        Self { status: StageStatus::Pending,
               started_at: None,
               completed_at: None,
               error: None,
               attempts: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub upload_id: String,
    pub merchant_id: String,
    pub status: WorkflowStatus,
    pub current_stage: Option<StageTag>,
    pub progress_percent: u8,
    pub stages: BTreeMap<StageTag, StageRecord>,
    pub purchase_order_id: Option<String>,
    pub error_message: Option<String>,
    pub failed_stage: Option<StageTag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(id: String, upload_id: String, merchant_id: String, now: DateTime<Utc>) -> Self {
        let stages = StageTag::ORDER.into_iter().map(|t| (t, StageRecord::default())).collect();
        Self { id,
               upload_id,
               merchant_id,
               status: WorkflowStatus::Pending,
               current_stage: None,
               progress_percent: 0,
               stages,
               purchase_order_id: None,
               error_message: None,
               failed_stage: None,
               created_at: now,
               updated_at: now,
               completed_at: None }
    }

    /// Marks a stage as started: sets it `Processing`, bumps `attempts`,
    /// stamps `started_at`, and moves the workflow itself into `Processing`
    /// on first start.
    pub fn begin_stage(&mut self, stage: StageTag, now: DateTime<Utc>) {
        if self.status == WorkflowStatus::Pending {
            self.status = WorkflowStatus::Processing;
        }
        self.current_stage = Some(stage);
        let rec = self.stages.entry(stage).or_default();
        rec.status = StageStatus::Processing;
        rec.started_at.get_or_insert(now);
        rec.attempts += 1;
        self.updated_at = now;
    }

    pub fn complete_stage(&mut self, stage: StageTag, now: DateTime<Utc>) {
        let rec = self.stages.entry(stage).or_default();
        rec.status = StageStatus::Completed;
        rec.completed_at = Some(now);
        rec.error = None;
        self.updated_at = now;

        let completed = self.stages.values().filter(|r| r.status == StageStatus::Completed).count();
        self.progress_percent = ((completed * 100) / StageTag::ORDER.len()) as u8;
    }

    pub fn fail_stage(&mut self, stage: StageTag, error: impl Into<String>, now: DateTime<Utc>) {
        let rec = self.stages.entry(stage).or_default();
        rec.status = StageStatus::Failed;
        rec.completed_at = Some(now);
        rec.error = Some(error.into());
        self.updated_at = now;
    }

    /// Terminal failure of the whole workflow. Invariant: exactly one stage
    /// is `failed` and equals `failed_stage`.
    pub fn fail_workflow(&mut self, stage: StageTag, error: impl Into<String>, now: DateTime<Utc>) {
        let msg = error.into();
        self.fail_stage(stage, msg.clone(), now);
        self.status = WorkflowStatus::Failed;
        self.failed_stage = Some(stage);
        self.error_message = Some(msg);
        self.updated_at = now;
    }

    pub fn complete_workflow(&mut self, now: DateTime<Utc>) {
        self.status = WorkflowStatus::Completed;
        self.progress_percent = 100;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Invariant 3/4: `completed` implies every stage `completed`; stage
    /// tags observed `completed` only after their predecessor.
    pub fn validate_invariants(&self) -> Result<(), DomainError> {
        if self.status == WorkflowStatus::Completed {
            for tag in StageTag::ORDER {
                if self.stages.get(&tag).map(|r| r.status) != Some(StageStatus::Completed) {
                    return Err(DomainError::Validation(format!("workflow {} marked completed but stage {:?} is not",
                                                                self.id, tag)));
                }
            }
        }
        if self.status == WorkflowStatus::Failed {
            let failed_tags: Vec<StageTag> =
                StageTag::ORDER.into_iter()
                               .filter(|t| self.stages.get(t).map(|r| r.status) == Some(StageStatus::Failed))
                               .collect();
            if failed_tags.len() != 1 || Some(failed_tags[0]) != self.failed_stage {
                return Err(DomainError::Validation(format!("workflow {} failed-stage invariant violated", self.id)));
            }
        }
        let mut seen_incomplete = false;
        for tag in StageTag::ORDER {
            let completed = self.stages.get(&tag).map(|r| r.status) == Some(StageStatus::Completed);
            if completed && seen_incomplete {
                return Err(DomainError::Validation(format!("stage {:?} completed before a predecessor", tag)));
            }
            if !completed {
                seen_incomplete = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(StageTag::AiParsing.next(), Some(StageTag::DatabaseSave));
        assert_eq!(StageTag::StatusUpdate.next(), None);
    }

    #[test]
    fn completed_workflow_requires_all_stages_completed() {
        let now = Utc::now();
        let mut wf = Workflow::new("wf_1".into(), "up_1".into(), "m_1".into(), now);
        wf.complete_workflow(now);
        assert!(wf.validate_invariants().is_err());
    }

    #[test]
    fn failed_workflow_requires_exactly_one_failed_stage() {
        let now = Utc::now();
        let mut wf = Workflow::new("wf_1".into(), "up_1".into(), "m_1".into(), now);
        wf.begin_stage(StageTag::AiParsing, now);
        wf.fail_workflow(StageTag::AiParsing, "boom", now);
        assert!(wf.validate_invariants().is_ok());
    }

    #[test]
    fn non_fatal_stages_are_s4_and_s5() {
        assert!(StageTag::ImageAttachment.is_non_fatal());
        assert!(StageTag::ShopifySync.is_non_fatal());
        assert!(!StageTag::DatabaseSave.is_non_fatal());
    }
}
