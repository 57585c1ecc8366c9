//! The `ExternalSink` collaborator (spec §1: "the downstream marketplace
//! sync, treated as an ExternalSink with best-effort semantics").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use poflow_core::WorkflowError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    pub draft_id: String,
    pub title: String,
    pub price: f64,
    pub image_urls: Vec<String>,
}

#[async_trait]
pub trait ExternalSink: Send + Sync {
    async fn submit(&self, payload: SyncPayload) -> Result<(), WorkflowError>;
}

/// Deterministic in-memory fake: records every submission it receives so
/// tests can assert on what the sync stage sent.
#[derive(Default)]
pub struct FakeExternalSink {
    pub submissions: Mutex<Vec<SyncPayload>>,
}

#[async_trait]
impl ExternalSink for FakeExternalSink {
    async fn submit(&self, payload: SyncPayload) -> Result<(), WorkflowError> {
        self.submissions.lock().await.push(payload);
        Ok(())
    }
}
