//! Artifact download and MIME routing (spec §1: "the object-store holding
//! uploaded artifacts" is an out-of-scope external collaborator, consumed
//! here only as an interface) plus the file-extension routing S1 uses to
//! pick a parse path.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use poflow_core::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMime {
    Pdf,
    Image,
    Csv,
    Xlsx,
}

impl ArtifactMime {
    /// Routes by the file URL's extension (spec S1: "Routes by MIME type").
    /// Anything unrecognized falls back to the vision path rather than
    /// erroring, since an upload without a recognizable extension is still
    /// most likely a scanned image.
    pub fn from_file_url(file_url: &str) -> Self {
        let lower = file_url.to_lowercase();
        match lower.rsplit('.').next().unwrap_or("") {
            "pdf" => ArtifactMime::Pdf,
            "csv" => ArtifactMime::Csv,
            "xlsx" | "xls" => ArtifactMime::Xlsx,
            _ => ArtifactMime::Image,
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn fetch(&self, file_url: &str) -> Result<Vec<u8>, WorkflowError>;
}

/// Deterministic in-memory fake keyed by `file_url`, standing in for a real
/// object-store client in tests.
#[derive(Default)]
pub struct FakeArtifactStore {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, file_url: impl Into<String>, bytes: Vec<u8>) {
        self.artifacts.lock().await.insert(file_url.into(), bytes);
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn fetch(&self, file_url: &str) -> Result<Vec<u8>, WorkflowError> {
        self.artifacts
            .lock()
            .await
            .get(file_url)
            .cloned()
            .ok_or_else(|| WorkflowError::Internal(format!("no artifact seeded for {file_url}")))
    }
}
