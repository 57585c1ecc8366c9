//! `ProductDraft` and the variant/image shapes it owns (S3/S4 outputs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftStatus {
    Draft,
    Review,
    Approved,
    Rejected,
    Synced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
    pub score: f64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDraft {
    pub id: String,
    pub line_item_id: String,
    pub merchant_id: String,
    pub purchase_order_id: String,
    pub session_id: String,
    pub original_title: String,
    pub refined_title: Option<String>,
    pub original_price: f64,
    pub price_refined: Option<f64>,
    pub estimated_margin: Option<f64>,
    pub status: DraftStatus,
    pub variants: Vec<ProductVariant>,
    pub images: Vec<ProductImage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductDraft {
    pub fn new(id: String,
               line_item_id: String,
               merchant_id: String,
               purchase_order_id: String,
               session_id: String,
               original_title: String,
               original_price: f64,
               now: DateTime<Utc>)
               -> Self {
        Self { id,
               line_item_id,
               merchant_id,
               purchase_order_id,
               session_id,
               original_title,
               refined_title: None,
               original_price,
               price_refined: None,
               estimated_margin: None,
               status: DraftStatus::Draft,
               variants: Vec::new(),
               images: Vec::new(),
               created_at: now,
               updated_at: now }
    }

    /// Attaches the top-N scored image candidates (spec S4: top 3).
    pub fn attach_top_images(&mut self, mut candidates: Vec<ProductImage>, top_n: usize, now: DateTime<Utc>) {
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(top_n);
        self.images = candidates;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub merchant_id: String,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// A temporary session created when no reusable session exists for the
    /// merchant (spec S3: "failure to find a session triggers creation of a
    /// temporary session").
    pub fn temporary(id: String, merchant_id: String, now: DateTime<Utc>) -> Self {
        Self { id, merchant_id, external_reference: None, created_at: now, expires_at: now + chrono::Duration::hours(1) }
    }
}
