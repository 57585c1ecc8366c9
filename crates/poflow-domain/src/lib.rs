//! poflow-domain: neutral entities and invariants for the PO workflow core.
//!
//! Mirrors the role `chem-domain` plays for chemflow: pure data + validation,
//! no I/O, no knowledge of the orchestration or persistence layers above it.

pub mod errors;
pub mod fuzzy_engine;
pub mod ids;
pub mod product_draft;
pub mod progress;
pub mod purchase_order;
pub mod supplier;
pub mod workflow;

pub use errors::DomainError;
pub use fuzzy_engine::FuzzyEngine;
pub use product_draft::{DraftStatus, ProductDraft, ProductImage, ProductVariant, Session};
pub use progress::{channel_name, ProgressEvent, ProgressEventType};
pub use purchase_order::{detect_pack_quantity, LineItem, PoStatus, PurchaseOrder};
pub use supplier::{ParsedSupplier, Supplier};
pub use workflow::{StageRecord, StageStatus, StageTag, Workflow, WorkflowStatus};
