//! `PurchaseOrder` and its owned `LineItem`s, plus the pack-quantity
//! extraction rule applied while building line items from parsed data.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoStatus {
    Pending,
    Processing,
    ReviewNeeded,
    LowConfidenceReview,
    Completed,
    Failed,
    Denied,
    Synced,
}

impl PoStatus {
    /// S6 confidence-threshold mapping.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            PoStatus::Completed
        } else if confidence >= 0.7 {
            PoStatus::ReviewNeeded
        } else {
            PoStatus::LowConfidenceReview
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub purchase_order_id: String,
    pub description: String,
    pub sku: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
    pub confidence: f64,
}

/// Max allowed drift between `total_price` and `quantity * unit_price`,
/// expressed as currency ULPs (spec invariant 2: `<= 0.01`).
const ARITHMETIC_TOLERANCE: f64 = 0.01;

/// Recognized pack-quantity patterns: `Case of N`, `N ct`, `N-Pack`,
/// `Pack of N`. Case-insensitive, first match wins.
static PACK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![Regex::new(r"(?i)case of\s+(\d+)").unwrap(),
         Regex::new(r"(?i)(\d+)\s*ct\b").unwrap(),
         Regex::new(r"(?i)(\d+)\s*-\s*pack\b").unwrap(),
         Regex::new(r"(?i)pack of\s+(\d+)").unwrap(),]
});

/// Extracts the pack size `N` from a description, if it matches one of the
/// recognized patterns.
pub fn detect_pack_quantity(description: &str) -> Option<i64> {
    PACK_PATTERNS.iter().find_map(|re| {
                             re.captures(description)
                               .and_then(|c| c.get(1))
                               .and_then(|m| m.as_str().parse::<i64>().ok())
                               .filter(|n| *n > 1)
                         })
}

impl LineItem {
    /// Builds a line item from freshly-extracted fields, applying the
    /// pack-quantity rule (spec §3): if the description matches a pack
    /// pattern with value `N` and the extracted quantity is null/1, the
    /// stored quantity becomes `N` and unit price is divided by `N`, leaving
    /// `total_price` unchanged.
    pub fn from_extracted(id: String,
                           purchase_order_id: String,
                           description: String,
                           sku: Option<String>,
                           quantity: Option<i64>,
                           unit_price: f64,
                           total_price: f64,
                           confidence: f64)
                           -> Result<Self, DomainError> {
        let extracted_qty = quantity.unwrap_or(1);
        let (final_qty, final_unit_price) = match detect_pack_quantity(&description) {
            Some(n) if extracted_qty <= 1 => (n, unit_price / n as f64),
            _ => (extracted_qty.max(1), unit_price),
        };

        let item = Self { id,
                          purchase_order_id,
                          description,
                          sku,
                          quantity: final_qty,
                          unit_price: final_unit_price,
                          total_price,
                          confidence };
        item.validate_arithmetic()?;
        Ok(item)
    }

    pub fn validate_arithmetic(&self) -> Result<(), DomainError> {
        let expected = self.quantity as f64 * self.unit_price;
        if (self.total_price - expected).abs() > ARITHMETIC_TOLERANCE {
            return Err(DomainError::Arithmetic(format!("line item {}: total {} != qty {} * unit {} (expected {})",
                                                        self.id, self.total_price, self.quantity, self.unit_price,
                                                        expected)));
        }
        if self.quantity < 1 {
            return Err(DomainError::Validation(format!("line item {}: quantity must be >= 1", self.id)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub merchant_id: String,
    pub number: String,
    pub supplier_id: Option<String>,
    pub status: PoStatus,
    pub confidence: f64,
    pub total_amount: f64,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub processing_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub job_completed_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    pub fn new(id: String, merchant_id: String, number: String, currency: String, confidence: f64, now: DateTime<Utc>)
               -> Self {
        Self { id,
               merchant_id,
               number,
               supplier_id: None,
               status: PoStatus::Pending,
               confidence,
               total_amount: 0.0,
               currency,
               line_items: Vec::new(),
               processing_notes: None,
               created_at: now,
               updated_at: now,
               job_completed_at: None }
    }

    pub fn recompute_total(&mut self) {
        self.total_amount = self.line_items.iter().map(|li| li.total_price).sum();
    }
}
