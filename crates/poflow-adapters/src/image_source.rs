//! The `ImageSource` collaborator (spec §1: "the image search/scraping
//! mechanism, treated as an ImageSource returning ranked candidates").

use std::collections::HashMap;

use async_trait::async_trait;
use poflow_policies::ImageCandidate;

use poflow_core::WorkflowError;

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// One query per product (spec S4: `"{brand} {specific_product}"`).
    async fn search(&self, query: &str) -> Result<Vec<ImageCandidate>, WorkflowError>;
}

/// Deterministic in-memory fake keyed by the exact query string.
#[derive(Default)]
pub struct FakeImageSource {
    pub results: HashMap<String, Vec<ImageCandidate>>,
}

#[async_trait]
impl ImageSource for FakeImageSource {
    async fn search(&self, query: &str) -> Result<Vec<ImageCandidate>, WorkflowError> {
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}
