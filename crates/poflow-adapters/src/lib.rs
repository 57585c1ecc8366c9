//! Stage processors (C4) and their out-of-scope collaborator seams —
//! `ArtifactStore`, `Extractor`, `PdfTextExtractor`, `ImageSource`,
//! `ExternalSink` — wired against `poflow-core`'s `StageProcessor` contract
//! and `poflow-policies`' pure decision functions.

pub mod artifact_store;
pub mod chunking;
pub mod csv_parser;
pub mod external_sink;
pub mod extractor;
pub mod image_source;
pub mod pdf_text;
pub mod stages;

pub use artifact_store::{ArtifactMime, ArtifactStore, FakeArtifactStore};
pub use external_sink::{ExternalSink, FakeExternalSink, SyncPayload};
pub use extractor::{ExtractedDocument, ExtractedLineItemData, Extractor, ExtractorInput, FakeExtractor};
pub use image_source::{FakeImageSource, ImageSource};
pub use pdf_text::{PdfTextExtractor, PlaceholderPdfTextExtractor};

pub use stages::draft::{DraftOutput, DraftStage};
pub use stages::finalize::{FinalizeOutput, FinalizeStage};
pub use stages::images::{ImageStage, ImagesOutput};
pub use stages::parse::{ParseOutput, ParseStage};
pub use stages::save::{LineItemSummary, SaveOutput, SaveStage};
pub use stages::sync::{SyncOutput, SyncStage};
