//! The `Extractor` collaborator (spec §1: "the vision/LLM text-extraction
//! model, treated as an opaque Extractor returning structured fields +
//! confidence"). Out of scope to build for real; this module only defines
//! the seam and a deterministic in-memory fake, the same treatment
//! `chem_adapters::steps::acquire` gives a synthetic data source instead of
//! calling out to a real RDKit service.

use async_trait::async_trait;
use poflow_domain::ParsedSupplier;
use serde::{Deserialize, Serialize};

use poflow_core::WorkflowError;

#[derive(Debug, Clone)]
pub struct ExtractorInput {
    /// Page or chunk text, for the PDF/XLSX text paths.
    pub text: Option<String>,
    /// Raw image bytes, for the vision path.
    pub image_bytes: Option<Vec<u8>>,
    /// Carried explicitly rather than assumed so a caller that
    /// misconfigures `AI_TEMPERATURE` away from 0 is visible in the request
    /// itself, not just in a config dump (spec §9 "temperature-0
    /// determinism").
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLineItemData {
    pub description: String,
    pub sku: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
}

impl ExtractedLineItemData {
    /// Spec S1 validation: non-null description, numeric quantity (or a
    /// recoverable pack pattern), numeric unit price.
    pub fn is_complete(&self) -> bool {
        !self.description.trim().is_empty()
            && self.unit_price.is_some()
            && (self.quantity.is_some() || poflow_domain::detect_pack_quantity(&self.description).is_some())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub po_number: Option<String>,
    pub supplier: ParsedSupplier,
    pub line_items: Vec<ExtractedLineItemData>,
    pub currency: String,
    /// 0..100, the extractor's self-assessed confidence (spec S1).
    pub confidence_overall: f64,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, input: ExtractorInput) -> Result<ExtractedDocument, WorkflowError>;
}

/// Deterministic in-memory fake: always returns the same fixed document,
/// standing in for a real vision/LLM call in tests.
pub struct FakeExtractor {
    pub document: ExtractedDocument,
}

impl FakeExtractor {
    pub fn new(document: ExtractedDocument) -> Self {
        Self { document }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, _input: ExtractorInput) -> Result<ExtractedDocument, WorkflowError> {
        Ok(self.document.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_item_with_pack_pattern_and_null_quantity_is_complete() {
        let item = ExtractedLineItemData {
            description: "Case of 12 widgets".into(),
            sku: None,
            quantity: None,
            unit_price: Some(2.0),
            total_price: Some(24.0),
        };
        assert!(item.is_complete());
    }

    #[test]
    fn line_item_missing_unit_price_is_incomplete() {
        let item = ExtractedLineItemData {
            description: "Widget".into(),
            sku: None,
            quantity: Some(1),
            unit_price: None,
            total_price: None,
        };
        assert!(!item.is_complete());
    }
}
