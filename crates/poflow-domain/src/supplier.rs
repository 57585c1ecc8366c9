//! `Supplier` entity and the raw (unmatched) record parsed off an artifact.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub merchant_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

/// A supplier record as parsed off the artifact, before fuzzy matching
/// against existing suppliers (spec §4.3.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSupplier {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

impl Supplier {
    pub fn new(id: String, merchant_id: String, parsed: ParsedSupplier) -> Self {
        Self { id, merchant_id, name: parsed.name, email: parsed.email, phone: parsed.phone, website: parsed.website }
    }
}
