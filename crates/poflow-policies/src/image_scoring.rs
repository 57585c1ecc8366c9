//! Brand detection and image-candidate scoring (spec S4): deciding what to
//! search for and ranking what comes back, both pure functions over
//! already-extracted strings — no `ImageSource` call happens here.

/// Small dictionary of brands the scorer recognizes by name. Real catalogs
/// would load this from configuration; a fixed list is enough to exercise
/// the "known-brand dictionary with fallback" rule deterministically.
const KNOWN_BRANDS: &[&str] =
    &["Acme", "Nike", "Sony", "Apple", "Samsung", "Bosch", "Dewalt", "Kraft", "Nestle", "LG"];

/// Domains the scorer trusts for product imagery (spec S4 "trusted-domain
/// list").
const TRUSTED_DOMAINS: &[&str] =
    &["images.unsplash.com", "cdn.shopify.com", "m.media-amazon.com", "images.cdn.acme.com"];

/// Detects the brand to search for: a known-brand dictionary hit first,
/// falling back to the title's first capitalized word (spec S4).
pub fn detect_brand(title: &str) -> String {
    let lower_title = title.to_lowercase();
    if let Some(brand) = KNOWN_BRANDS.iter().find(|b| lower_title.contains(&b.to_lowercase())) {
        return brand.to_string();
    }
    title.split_whitespace()
         .find(|w| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
         .or_else(|| title.split_whitespace().next())
         .unwrap_or("")
         .to_string()
}

#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub url: String,
    /// Freeform text associated with the candidate by the image source
    /// (e.g. alt text or surrounding page title) — used for keyword
    /// coverage scoring.
    pub context: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredImage {
    pub url: String,
    pub score: f64,
}

/// Scores one candidate 0..1 on three signals (spec S4): brand match in the
/// URL or context, keyword coverage against the product's description
/// words, and trusted-domain membership.
pub fn score_image_candidate(candidate: &ImageCandidate, brand: &str, product_keywords: &[String]) -> ScoredImage {
    let haystack = format!("{} {}", candidate.url, candidate.context).to_lowercase();

    let mut score = 0.0;
    if !brand.is_empty() && haystack.contains(&brand.to_lowercase()) {
        score += 0.4;
    }

    if !product_keywords.is_empty() {
        let matched = product_keywords.iter().filter(|k| !k.is_empty() && haystack.contains(&k.to_lowercase())).count();
        score += 0.4 * (matched as f64 / product_keywords.len() as f64);
    }

    if TRUSTED_DOMAINS.iter().any(|d| candidate.url.to_lowercase().contains(d)) {
        score += 0.2;
    }

    ScoredImage { url: candidate.url.clone(), score: score.min(1.0) }
}

/// Scores every candidate and returns the top `n` by score, descending
/// (spec S4: top-3 images per product attached).
pub fn top_scored(candidates: &[ImageCandidate], brand: &str, product_keywords: &[String], n: usize) -> Vec<ScoredImage> {
    let mut scored: Vec<ScoredImage> =
        candidates.iter().map(|c| score_image_candidate(c, brand, product_keywords)).collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_brand_is_detected_from_dictionary() {
        assert_eq!(detect_brand("Sony WH-1000XM5 Headphones"), "Sony");
    }

    #[test]
    fn unknown_brand_falls_back_to_first_capitalized_word() {
        assert_eq!(detect_brand("Wobbleflex premium widget"), "Wobbleflex");
    }

    #[test]
    fn trusted_domain_and_brand_match_score_higher_than_neither() {
        let brand = "Acme";
        let keywords = vec!["widget".to_string()];
        let good = ImageCandidate {
            url: "https://images.cdn.acme.com/acme-widget.jpg".into(),
            context: "Acme widget product photo".into(),
        };
        let bad = ImageCandidate { url: "https://random-blog.example/post3.jpg".into(), context: "unrelated".into() };

        let good_score = score_image_candidate(&good, brand, &keywords);
        let bad_score = score_image_candidate(&bad, brand, &keywords);
        assert!(good_score.score > bad_score.score);
    }

    #[test]
    fn top_scored_truncates_and_sorts_descending() {
        let candidates = vec![
            ImageCandidate { url: "https://a.example/1.jpg".into(), context: "widget".into() },
            ImageCandidate {
                url: "https://images.cdn.acme.com/widget.jpg".into(),
                context: "Acme widget".into(),
            },
            ImageCandidate { url: "https://b.example/2.jpg".into(), context: "".into() },
        ];
        let top = top_scored(&candidates, "Acme", &["widget".to_string()], 2);
        assert_eq!(top.len(), 2);
        assert!(top[0].score >= top[1].score);
        assert!(top[0].url.contains("acme"));
    }
}
