//! poflow-policies: deterministic, I/O-free decision logic consumed by the
//! stage processors (`poflow-adapters`).
//!
//! Mirrors `chem-policies`'s role for the teacher: pure functions/structs
//! over already-fetched data, auditable and unit-testable without a
//! database or network call in sight. Three decisions live here:
//! supplier fuzzy-match engine selection (spec §4.3.2), product pricing
//! refinement (spec S3), and image-candidate scoring (spec S4).

pub mod fuzzy_engine_selection;
pub mod image_scoring;
pub mod pricing;

pub use fuzzy_engine_selection::{EngineSelectionConfig, FuzzyEngineSelector};
pub use image_scoring::{detect_brand, score_image_candidate, ImageCandidate, ScoredImage};
pub use pricing::{refine_price, PricingConfig, PricingResult};
