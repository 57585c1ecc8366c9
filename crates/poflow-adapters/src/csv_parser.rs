//! Native CSV parsing for S1's structured-artifact path (spec S1:
//! "CSV/XLSX: parse rows natively"). No CSV crate is part of the retrieval
//! pack's dependency stack, so this is a small hand-rolled splitter rather
//! than reaching for one off-corpus.
//!
//! Expects one line item per data row, with PO-level fields (number,
//! supplier, currency) repeated on every row — the common shape of a
//! flattened PO export:
//! `po_number,supplier_name,supplier_email,supplier_phone,supplier_website,currency,description,sku,quantity,unit_price,total_price`

use poflow_domain::ParsedSupplier;

use crate::extractor::{ExtractedDocument, ExtractedLineItemData};

const EXPECTED_COLUMNS: usize = 11;

/// Splits one line on commas, respecting double-quoted fields (with `""`
/// as the escaped-quote convention).
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parses a flattened PO CSV export into the same shape the `Extractor`
/// path would produce. Deterministic and never retried — there's no
/// extractor nondeterminism to hedge against on this path.
pub fn parse_csv(text: &str) -> ExtractedDocument {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    if lines.next().is_none() {
        return ExtractedDocument::default();
    }

    let mut doc = ExtractedDocument { confidence_overall: 100.0, ..ExtractedDocument::default() };
    let mut header_fields_set = false;

    for line in lines {
        let fields = split_row(line);
        if fields.len() < EXPECTED_COLUMNS {
            continue;
        }
        if !header_fields_set {
            doc.po_number = non_empty(&fields[0]);
            doc.supplier = ParsedSupplier {
                name: fields[1].trim().to_string(),
                email: non_empty(&fields[2]),
                phone: non_empty(&fields[3]),
                website: non_empty(&fields[4]),
            };
            doc.currency = non_empty(&fields[5]).unwrap_or_else(|| "USD".to_string());
            header_fields_set = true;
        }

        doc.line_items.push(ExtractedLineItemData {
            description: fields[6].trim().to_string(),
            sku: non_empty(&fields[7]),
            quantity: fields[8].trim().parse::<i64>().ok(),
            unit_price: fields[9].trim().parse::<f64>().ok(),
            total_price: fields[10].trim().parse::<f64>().ok(),
        });
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_data_rows() {
        let csv = "po_number,supplier_name,supplier_email,supplier_phone,supplier_website,currency,description,sku,quantity,unit_price,total_price\n\
                   PO-1001,Acme Inc,sales@acme.test,,,USD,Widget,SKU-1,2,5.00,10.00\n\
                   PO-1001,Acme Inc,sales@acme.test,,,USD,Case of 12 bolts,SKU-2,,2.00,24.00\n";
        let doc = parse_csv(csv);
        assert_eq!(doc.po_number.as_deref(), Some("PO-1001"));
        assert_eq!(doc.supplier.name, "Acme Inc");
        assert_eq!(doc.currency, "USD");
        assert_eq!(doc.line_items.len(), 2);
        assert_eq!(doc.line_items[0].quantity, Some(2));
        assert_eq!(doc.line_items[1].quantity, None);
    }

    #[test]
    fn quoted_commas_do_not_split_fields() {
        let row = split_row("PO-1,\"Acme, Inc\",a@b.com,,,USD,Widget,,1,1.0,1.0");
        assert_eq!(row[1], "Acme, Inc");
        assert_eq!(row.len(), EXPECTED_COLUMNS);
    }

    #[test]
    fn empty_body_yields_empty_document() {
        let doc = parse_csv("po_number,supplier_name,supplier_email,supplier_phone,supplier_website,currency,description,sku,quantity,unit_price,total_price\n");
        assert!(doc.line_items.is_empty());
    }
}
