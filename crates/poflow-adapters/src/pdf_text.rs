//! PDF text extraction (spec §4.4 S1: "extract text page-by-page using a
//! worker-based PDF library; dynamic-load the parser at first call to avoid
//! module-initialization-time file I/O").
//!
//! No PDF-parsing crate is part of the retrieval pack's dependency stack,
//! so the real parser stays behind this trait, out of scope to build for
//! real — the same treatment `Extractor`/`ImageSource`/`ExternalSink` get.
//! The "dynamic load" requirement is modeled with `once_cell::sync::OnceCell`
//! in `ParseStage`: the concrete parser is constructed on first use rather
//! than eagerly when the stage is built.

use poflow_core::WorkflowError;

pub trait PdfTextExtractor: Send + Sync {
    /// Extracts page text, one string per page, in page order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, WorkflowError>;
}

/// Stand-in parser: treats the artifact bytes as already-decoded text and
/// returns them as a single page. A real implementation would shell out to
/// a worker process, per the spec's "worker-based PDF library" note.
#[derive(Default)]
pub struct PlaceholderPdfTextExtractor;

impl PdfTextExtractor for PlaceholderPdfTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, WorkflowError> {
        Ok(vec![String::from_utf8_lossy(bytes).into_owned()])
    }
}
