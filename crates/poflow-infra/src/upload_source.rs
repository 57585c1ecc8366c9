//! Upload discovery (spec §4.9 Tick Dispatcher, first bullet: "discover
//! uploads awaiting processing"). Nothing upstream of the pipeline models an
//! `Upload` entity — the first `Workflow`/`PurchaseOrder` rows only appear
//! once a stage has actually started running — so this is a new opaque
//! collaborator seam, shaped exactly like `ArtifactStore`/`Extractor`/
//! `ImageSource`/`ExternalSink` in `poflow_adapters`: the merchant's upload
//! intake (file storage callback, webhook queue, whatever front-end feeds
//! this pipeline) is out of scope, so the dispatcher depends on a trait
//! instead of a concrete client.

use async_trait::async_trait;
use poflow_core::errors::WorkflowError;

/// One file waiting to enter the pipeline. `extracted_po_number` is a hint
/// only — real PO numbers aren't known until S1 parses the document — used
/// by the dispatcher to deduplicate re-uploads of the same order before
/// starting a second workflow for it (spec §9 Open Question: what counts as
/// a duplicate upload). `None` means dedup falls back to `upload_id` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub upload_id: String,
    pub merchant_id: String,
    pub file_url: String,
    pub extracted_po_number: Option<String>,
}

#[async_trait]
pub trait UploadSource: Send + Sync {
    /// Uploads that have no workflow yet and are ready to start. Must
    /// complete well inside the Tick Dispatcher's <10s budget — this is a
    /// discovery call, not a processing one.
    async fn pending_uploads(&self) -> Result<Vec<PendingUpload>, WorkflowError>;
}

/// Deterministic fake for tests and local runs: returns a fixed, seedable
/// list once, then an empty list, so a tick loop under test doesn't spin
/// forever re-discovering the same uploads.
pub struct FakeUploadSource {
    uploads: std::sync::Mutex<Vec<PendingUpload>>,
}

impl FakeUploadSource {
    pub fn new(uploads: Vec<PendingUpload>) -> Self {
        Self { uploads: std::sync::Mutex::new(uploads) }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl UploadSource for FakeUploadSource {
    async fn pending_uploads(&self) -> Result<Vec<PendingUpload>, WorkflowError> {
        Ok(std::mem::take(&mut *self.uploads.lock().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_drains_once() {
        let source = FakeUploadSource::new(vec![PendingUpload {
            upload_id: "up_1".into(),
            merchant_id: "m_1".into(),
            file_url: "https://example.com/po.pdf".into(),
            extracted_po_number: None,
        }]);

        let first = source.pending_uploads().await.unwrap();
        assert_eq!(first.len(), 1);
        let second = source.pending_uploads().await.unwrap();
        assert!(second.is_empty());
    }
}
