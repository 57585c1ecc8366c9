//! Wire format for progress events published over the pub/sub fabric (C1).
//! Transient — never persisted; the workflow row and database are the
//! source of truth (spec §3, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::StageTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressEventType {
    Progress,
    Stage,
    Completion,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressEventType,
    pub workflow_id: String,
    pub stage: StageTag,
    pub percent: u8,
    pub message: Option<String>,
    pub ts: i64,
    pub extra: Option<Value>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressEventType, workflow_id: impl Into<String>, stage: StageTag, percent: u8, ts: DateTime<Utc>)
               -> Self {
        Self { kind, workflow_id: workflow_id.into(), stage, percent: percent.min(100), message: None, ts: ts.timestamp_millis(), extra: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Channel naming convention from spec §6: `merchant:{id}:{type}`.
pub fn channel_name(merchant_id: &str, kind: ProgressEventType) -> String {
    let suffix = match kind {
        ProgressEventType::Progress => "progress",
        ProgressEventType::Stage => "stage",
        ProgressEventType::Completion => "completion",
        ProgressEventType::Error => "error",
    };
    format!("merchant:{merchant_id}:{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_follow_convention() {
        assert_eq!(channel_name("m1", ProgressEventType::Progress), "merchant:m1:progress");
        assert_eq!(channel_name("m1", ProgressEventType::Error), "merchant:m1:error");
    }

    #[test]
    fn percent_is_clamped() {
        let ev = ProgressEvent::new(ProgressEventType::Progress, "wf1", StageTag::AiParsing, 250, Utc::now());
        assert_eq!(ev.percent, 100);
    }
}
