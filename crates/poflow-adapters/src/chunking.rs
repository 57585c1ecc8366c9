//! Chunking and dedup for text fed to the extractor (spec §4.4 S1
//! "Chunking": inputs exceeding a size threshold are split into overlapping
//! chunks; outputs are deduplicated by exact-then-fuzzy matching).

use crate::extractor::ExtractedLineItemData;

const MAX_CHUNK_LEN: usize = 4_000;
const MIN_OVERLAP: usize = 30;
const MAX_OVERLAP: usize = 180;

/// Fuzzy-dedup threshold for descriptions across merged chunks (spec: "≥85%
/// similarity").
const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Splits `text` into chunks no longer than `MAX_CHUNK_LEN`, overlapping by
/// 30-180 chars depending on boundary quality: a cut that lands on
/// whitespace needs little overlap to recover context, one that lands
/// mid-word needs the maximum.
pub fn chunk_text(text: &str) -> Vec<String> {
    if text.len() <= MAX_CHUNK_LEN {
        return vec![text.to_string()];
    }

    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < bytes.len() {
        let end = (start + MAX_CHUNK_LEN).min(bytes.len());
        chunks.push(text[start..end].to_string());
        if end == bytes.len() {
            break;
        }

        let clean_boundary = bytes[end - 1].is_ascii_whitespace();
        let overlap = if clean_boundary { MIN_OVERLAP } else { MAX_OVERLAP };
        start = end - overlap.min(end);
    }

    chunks
}

/// Merges per-chunk line items, dropping exact (case-insensitive) and
/// near-duplicate (≥85% normalized Levenshtein similarity) descriptions —
/// the overlap regions between adjacent chunks otherwise double-count
/// whatever line item straddles the cut.
pub fn dedupe_line_items(items: Vec<ExtractedLineItemData>) -> Vec<ExtractedLineItemData> {
    let mut merged: Vec<ExtractedLineItemData> = Vec::with_capacity(items.len());

    'items: for item in items {
        let candidate = item.description.trim().to_lowercase();
        for existing in &merged {
            let seen = existing.description.trim().to_lowercase();
            if seen == candidate || strsim::normalized_levenshtein(&seen, &candidate) >= DEDUP_SIMILARITY_THRESHOLD {
                continue 'items;
            }
        }
        merged.push(item);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk_text("short document").len(), 1);
    }

    #[test]
    fn long_text_is_split_with_overlap() {
        let text = "a".repeat(9_000);
        let chunks = chunk_text(&text);
        assert!(chunks.len() >= 2);
        // Consecutive chunks overlap: the end of one reappears at the start
        // of the next.
        let overlap_len = MAX_OVERLAP.min(chunks[0].len());
        assert_eq!(&chunks[0][chunks[0].len() - overlap_len..], &chunks[1][..overlap_len]);
    }

    #[test]
    fn exact_and_near_duplicates_are_dropped() {
        let items = vec![
            ExtractedLineItemData { description: "Widget A".into(), sku: None, quantity: Some(1), unit_price: Some(1.0), total_price: Some(1.0) },
            ExtractedLineItemData { description: "widget a".into(), sku: None, quantity: Some(1), unit_price: Some(1.0), total_price: Some(1.0) },
            ExtractedLineItemData { description: "Widget A.".into(), sku: None, quantity: Some(1), unit_price: Some(1.0), total_price: Some(1.0) },
            ExtractedLineItemData { description: "Completely different gadget".into(), sku: None, quantity: Some(1), unit_price: Some(1.0), total_price: Some(1.0) },
        ];
        let deduped = dedupe_line_items(items);
        assert_eq!(deduped.len(), 2);
    }
}
