//! S1 — Parse (tag `ai_parsing`, budget 90 s).
//!
//! Downloads the artifact, routes by file extension, and normalizes
//! whatever comes back into one `ParseOutput` for S2. Grounded in
//! `chem_adapters::steps::acquire`'s "synthetic source, no real I/O" shape
//! for the out-of-scope collaborators (`ArtifactStore`, `Extractor`,
//! `PdfTextExtractor`), generalized from a single deterministic dataset to
//! a MIME-routed dispatch since this pipeline has four artifact kinds
//! instead of one.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use poflow_domain::{ParsedSupplier, StageTag};
use serde::{Deserialize, Serialize};

use poflow_core::errors::WorkflowError;
use poflow_core::stage::{StageContext, StageOutcome, StageProcessor};

use crate::artifact_store::{ArtifactMime, ArtifactStore};
use crate::chunking;
use crate::csv_parser;
use crate::extractor::{ExtractedDocument, ExtractedLineItemData, Extractor, ExtractorInput};
use crate::pdf_text::{PdfTextExtractor, PlaceholderPdfTextExtractor};

use super::publish_progress;

/// Normalized shape handed to S2, serialized into `next_stage_data` (spec
/// S1: "Produces a normalized { extracted_data: {...}, confidence: {...} }").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutput {
    pub po_number: Option<String>,
    pub supplier: ParsedSupplier,
    pub line_items: Vec<ExtractedLineItemData>,
    pub currency: String,
    /// 0..1, downgraded to ≤0.7 if validation still fails after the retry
    /// (spec S1 "Validation").
    pub confidence: f64,
}

pub struct ParseStage {
    artifact_store: Arc<dyn ArtifactStore>,
    extractor: Arc<dyn Extractor>,
    pdf_extractor_factory: fn() -> Arc<dyn PdfTextExtractor>,
    pdf_extractor: OnceCell<Arc<dyn PdfTextExtractor>>,
    /// `AI_TEMPERATURE` (spec §6 Configuration Surface); must be 0 for the
    /// retry-then-accept rule below to be sound (spec §9).
    ai_temperature: f64,
}

impl ParseStage {
    pub fn new(artifact_store: Arc<dyn ArtifactStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self::with_pdf_extractor_factory(artifact_store, extractor, || Arc::new(PlaceholderPdfTextExtractor))
    }

    pub fn with_pdf_extractor_factory(
        artifact_store: Arc<dyn ArtifactStore>,
        extractor: Arc<dyn Extractor>,
        pdf_extractor_factory: fn() -> Arc<dyn PdfTextExtractor>,
    ) -> Self {
        let ai_temperature = std::env::var("AI_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(0.0);
        if ai_temperature != 0.0 {
            log::warn!("AI_TEMPERATURE={ai_temperature} is non-zero; parse retries will not be deterministic");
        }
        Self { artifact_store, extractor, pdf_extractor_factory, pdf_extractor: OnceCell::new(), ai_temperature }
    }

    /// Dynamic-loads the PDF text parser on first use (spec S1 "dynamic-load
    /// the parser at first call to avoid module-initialization-time file
    /// I/O").
    fn pdf_extractor(&self) -> Arc<dyn PdfTextExtractor> {
        self.pdf_extractor.get_or_init(|| (self.pdf_extractor_factory)()).clone()
    }

    async fn parse_once(&self, mime: ArtifactMime, bytes: &[u8]) -> Result<ExtractedDocument, WorkflowError> {
        match mime {
            ArtifactMime::Csv => Ok(csv_parser::parse_csv(&String::from_utf8_lossy(bytes))),
            ArtifactMime::Pdf => {
                let pages = self.pdf_extractor().extract_pages(bytes)?;
                self.extract_chunked_text(&pages.join("\n")).await
            }
            // No XLSX crate is part of the workspace's dependency stack;
            // handed to the extractor as decoded text, same boundary the
            // PDF path uses.
            ArtifactMime::Xlsx => self.extract_chunked_text(&String::from_utf8_lossy(bytes)).await,
            ArtifactMime::Image => {
                let input = ExtractorInput { text: None, image_bytes: Some(bytes.to_vec()), temperature: self.ai_temperature };
                self.extractor.extract(input).await
            }
        }
    }

    /// Chunks `text` if it's large (spec S1 "Chunking"), submits each chunk
    /// to the extractor, and merges + dedupes the results. PO-level fields
    /// (number, supplier, currency) are taken from the first chunk that
    /// carries them, since they're expected to repeat near the top of the
    /// document rather than vary per chunk.
    async fn extract_chunked_text(&self, text: &str) -> Result<ExtractedDocument, WorkflowError> {
        let mut merged = ExtractedDocument::default();
        let mut confidences = Vec::new();

        for chunk in chunking::chunk_text(text) {
            let input = ExtractorInput { text: Some(chunk), image_bytes: None, temperature: self.ai_temperature };
            let doc = self.extractor.extract(input).await?;
            if merged.po_number.is_none() {
                merged.po_number = doc.po_number;
            }
            if merged.supplier.name.is_empty() {
                merged.supplier = doc.supplier;
            }
            if merged.currency.is_empty() {
                merged.currency = doc.currency;
            }
            merged.line_items.extend(doc.line_items);
            confidences.push(doc.confidence_overall);
        }

        merged.line_items = chunking::dedupe_line_items(merged.line_items);
        merged.confidence_overall = if confidences.is_empty() { 0.0 } else { confidences.iter().sum::<f64>() / confidences.len() as f64 };
        Ok(merged)
    }
}

#[async_trait]
impl StageProcessor for ParseStage {
    fn stage(&self) -> StageTag {
        StageTag::AiParsing
    }

    async fn process(&self, ctx: &StageContext<'_>) -> Result<StageOutcome, WorkflowError> {
        publish_progress(ctx, StageTag::AiParsing, 5, "starting").await;

        let job = ctx.job;
        let file_url = job
            .data
            .get("file_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WorkflowError::Internal("parse stage requires job.data.file_url".into()))?
            .to_string();

        let bytes = self.artifact_store.fetch(&file_url).await?;
        let mime = ArtifactMime::from_file_url(&file_url);

        let mut doc = self.parse_once(mime, &bytes).await?;
        let mut incomplete = doc.line_items.iter().any(|li| !li.is_complete());

        // Spec S1: "Incomplete parse triggers one automatic retry
        // (idempotent re-submission). If still incomplete, proceed but mark
        // confidence ≤ 0.7." Temperature 0 makes the retry a true repeat,
        // not a second roll of the dice.
        if incomplete {
            log::warn!("workflow {} parse incomplete, retrying once", job.workflow_id);
            if let Ok(retry_doc) = self.parse_once(mime, &bytes).await {
                doc = retry_doc;
                incomplete = doc.line_items.iter().any(|li| !li.is_complete());
            }
        }

        publish_progress(ctx, StageTag::AiParsing, 60, "extracted").await;

        let mut confidence = (doc.confidence_overall / 100.0).clamp(0.0, 1.0);
        if incomplete {
            confidence = confidence.min(0.7);
        }

        let output = ParseOutput {
            po_number: doc.po_number,
            supplier: doc.supplier,
            line_items: doc.line_items,
            currency: if doc.currency.is_empty() { "USD".to_string() } else { doc.currency },
            confidence,
        };

        let next_stage_data = serde_json::to_value(&output).map_err(|e| WorkflowError::Internal(e.to_string()))?;

        Ok(StageOutcome {
            result: serde_json::json!({ "line_items_extracted": output.line_items.len(), "confidence": output.confidence }),
            next_stage_data,
            purchase_order_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_store::FakeArtifactStore;
    use poflow_core::progress_fabric::ProgressPublisher;
    use poflow_domain::ProgressEvent;

    struct NullProgress;
    #[async_trait]
    impl ProgressPublisher for NullProgress {
        async fn publish(&self, _channel: &str, _event: ProgressEvent) {}
        async fn subscribe(&self, _channels: &[String]) -> tokio::sync::mpsc::Receiver<ProgressEvent> {
            tokio::sync::mpsc::channel(1).1
        }
    }

    fn job_for(file_url: &str) -> poflow_core::stage::Job {
        poflow_core::stage::Job {
            workflow_id: "wf_1".into(),
            merchant_id: "m_1".into(),
            upload_id: "up_1".into(),
            purchase_order_id: None,
            stage: StageTag::AiParsing,
            data: serde_json::json!({ "file_url": file_url }),
            mode: poflow_core::stage::ExecutionMode::Sequential,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn csv_path_requires_no_extractor_call() {
        let store = Arc::new(FakeArtifactStore::new());
        store
            .seed(
                "file://po.csv",
                b"po_number,supplier_name,supplier_email,supplier_phone,supplier_website,currency,description,sku,quantity,unit_price,total_price\n\
                  PO-1,Acme,,,,USD,Widget,SKU1,1,5.0,5.0\n"
                    .to_vec(),
            )
            .await;
        let extractor = Arc::new(crate::extractor::FakeExtractor::new(ExtractedDocument::default()));
        let stage = ParseStage::new(store, extractor);

        let job = job_for("file://po.csv");
        let progress = NullProgress;
        let ctx = StageContext { job: &job, progress: &progress };
        let outcome = stage.process(&ctx).await.unwrap();
        let output: ParseOutput = serde_json::from_value(outcome.next_stage_data).unwrap();
        assert_eq!(output.po_number.as_deref(), Some("PO-1"));
        assert_eq!(output.line_items.len(), 1);
        assert_eq!(output.confidence, 1.0);
    }

    #[tokio::test]
    async fn incomplete_extraction_downgrades_confidence_after_retry() {
        let store = Arc::new(FakeArtifactStore::new());
        store.seed("file://scan.png", b"irrelevant".to_vec()).await;
        let incomplete_doc = ExtractedDocument {
            po_number: Some("PO-9".into()),
            supplier: ParsedSupplier { name: "Acme".into(), ..Default::default() },
            line_items: vec![ExtractedLineItemData {
                description: "Mystery widget".into(),
                sku: None,
                quantity: None,
                unit_price: None,
                total_price: None,
            }],
            currency: "USD".into(),
            confidence_overall: 95.0,
        };
        let extractor = Arc::new(crate::extractor::FakeExtractor::new(incomplete_doc));
        let stage = ParseStage::new(store, extractor);

        let job = job_for("file://scan.png");
        let progress = NullProgress;
        let ctx = StageContext { job: &job, progress: &progress };
        let outcome = stage.process(&ctx).await.unwrap();
        let output: ParseOutput = serde_json::from_value(outcome.next_stage_data).unwrap();
        assert!(output.confidence <= 0.7);
    }
}
