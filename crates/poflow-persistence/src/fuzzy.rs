//! Supplier fuzzy match (spec §4.3.2): two interchangeable scoring engines
//! behind one weighted blend, with automatic fallback from B to A.
//!
//! Engine selection itself (request override > merchant setting > global
//! flag > rollout percentage > default) lives in `poflow-policies` — this
//! module only executes whichever engine it's told to run.

use diesel::prelude::*;
use diesel::sql_types::{Double, Text};
use log::warn;
use poflow_core::WorkflowError;
use poflow_domain::{FuzzyEngine, ParsedSupplier, Supplier};

use crate::conn::ConnectionManager;
use crate::schema::suppliers;

pub const MATCH_THRESHOLD: f64 = 0.7;

const WEIGHT_NAME: f64 = 0.5;
const WEIGHT_EMAIL: f64 = 0.2;
const WEIGHT_PHONE: f64 = 0.15;
const WEIGHT_WEBSITE: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub supplier: Supplier,
    pub score: f64,
    pub engine_used: FuzzyEngine,
}

fn normalize_phone(p: &str) -> String {
    p.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn hostname(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

fn blended_score(parsed: &ParsedSupplier, candidate: &Supplier, name_score: f64) -> f64 {
    let email_score = match (&parsed.email, &candidate.email) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => 1.0,
        (Some(_), Some(_)) => 0.0,
        _ => 0.0,
    };
    let phone_score = match (&parsed.phone, &candidate.phone) {
        (Some(a), Some(b)) if normalize_phone(a) == normalize_phone(b) && !a.is_empty() => 1.0,
        _ => 0.0,
    };
    let website_score = match (&parsed.website, &candidate.website) {
        (Some(a), Some(b)) if hostname(a) == hostname(b) && !hostname(a).is_empty() => 1.0,
        _ => 0.0,
    };

    name_score * WEIGHT_NAME + email_score * WEIGHT_EMAIL + phone_score * WEIGHT_PHONE + website_score * WEIGHT_WEBSITE
}

/// Engine A: pulls every supplier for the merchant and scores in-process.
pub async fn match_engine_a(
    conn_mgr: &ConnectionManager,
    merchant_id: &str,
    parsed: &ParsedSupplier,
) -> Result<Option<MatchResult>, WorkflowError> {
    let merchant_id = merchant_id.to_string();
    let candidates: Vec<SupplierRow> = conn_mgr
        .with_retry(move |conn| {
            suppliers::table
                .filter(suppliers::merchant_id.eq(&merchant_id))
                .load::<SupplierRow>(conn)
                .map_err(crate::error::from_diesel)
        })
        .await?;

    let mut best: Option<(Supplier, f64)> = None;
    for row in candidates {
        let candidate = row.into_domain();
        let score = blended_score(parsed, &candidate, name_similarity(&parsed.name, &candidate.name));
        if best.as_ref().map(|(_, b)| score > *b).unwrap_or(true) {
            best = Some((candidate, score));
        }
    }

    Ok(best
        .filter(|(_, score)| *score >= MATCH_THRESHOLD)
        .map(|(supplier, score)| MatchResult { supplier, score, engine_used: FuzzyEngine::A }))
}

/// Engine B: a single `pg_trgm`-indexed query ranking by `similarity()`.
/// Falls back to Engine A transparently if the query itself errors (spec
/// §4.3.2 "automatic fallback").
pub async fn match_engine_b(
    conn_mgr: &ConnectionManager,
    merchant_id: &str,
    parsed: &ParsedSupplier,
) -> Result<Option<MatchResult>, WorkflowError> {
    let merchant_id_owned = merchant_id.to_string();
    let name = parsed.name.clone();

    let top: Result<Vec<TrigramRow>, WorkflowError> = conn_mgr
        .with_retry(move |conn| {
            diesel::sql_query(
                "SELECT id, merchant_id, name, email, phone, website, similarity(name, $1) AS sim \
                 FROM suppliers WHERE merchant_id = $2 ORDER BY sim DESC LIMIT 1",
            )
            .bind::<Text, _>(name.clone())
            .bind::<Text, _>(merchant_id_owned.clone())
            .load::<TrigramRow>(conn)
            .map_err(crate::error::from_diesel)
        })
        .await;

    let top = match top {
        Ok(rows) => rows,
        Err(e) => {
            warn!("engine B query failed, falling back to engine A: {e}");
            return match_engine_a(conn_mgr, merchant_id, parsed).await;
        }
    };

    let Some(row) = top.into_iter().next() else { return Ok(None) };
    let candidate = row.clone().into_domain();
    let score = blended_score(parsed, &candidate, row.sim);

    Ok((score >= MATCH_THRESHOLD)
        .then_some(MatchResult { supplier: candidate, score, engine_used: FuzzyEngine::B }))
}

#[derive(Queryable, Clone)]
#[diesel(table_name = suppliers)]
struct SupplierRow {
    id: String,
    merchant_id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    website: Option<String>,
}

impl SupplierRow {
    fn into_domain(self) -> Supplier {
        Supplier { id: self.id, merchant_id: self.merchant_id, name: self.name, email: self.email, phone: self.phone, website: self.website }
    }
}

#[derive(QueryableByName, Clone)]
struct TrigramRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    merchant_id: String,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = diesel::sql_types::Nullable<Text>)]
    email: Option<String>,
    #[diesel(sql_type = diesel::sql_types::Nullable<Text>)]
    phone: Option<String>,
    #[diesel(sql_type = diesel::sql_types::Nullable<Text>)]
    website: Option<String>,
    #[diesel(sql_type = Double)]
    sim: f64,
}

impl TrigramRow {
    fn into_domain(self) -> Supplier {
        Supplier { id: self.id, merchant_id: self.merchant_id, name: self.name, email: self.email, phone: self.phone, website: self.website }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blended_score_weighs_name_heaviest() {
        let parsed = ParsedSupplier { name: "Acme Co".into(), email: None, phone: None, website: None };
        let candidate = Supplier { id: "s1".into(), merchant_id: "m1".into(), name: "Acme Co".into(), email: None, phone: None, website: None };
        let score = blended_score(&parsed, &candidate, name_similarity(&parsed.name, &candidate.name));
        assert!(score >= MATCH_THRESHOLD);
    }

    #[test]
    fn website_hostname_comparison_ignores_path_and_scheme() {
        assert_eq!(hostname("https://acme.com/catalog"), hostname("http://acme.com/"));
    }

    #[test]
    fn phone_comparison_ignores_formatting() {
        assert_eq!(normalize_phone("(555) 123-4567"), normalize_phone("555.123.4567"));
    }
}
