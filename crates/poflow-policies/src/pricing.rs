//! Pricing refinement (spec S3): `retail = cost × markup`, rounded to the
//! nearest price ending in `.99`, plus the margin that refined price implies.

use std::env;

#[derive(Debug, Clone, Copy)]
pub struct PricingConfig {
    /// Merchant-configured cost-to-retail multiplier. Falls back to the
    /// `DEFAULT_MARKUP_MULTIPLIER` env var (default `2.0`) when a merchant
    /// hasn't set one.
    pub markup_multiplier: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let markup_multiplier =
            env::var("DEFAULT_MARKUP_MULTIPLIER").ok().and_then(|v| v.parse().ok()).unwrap_or(2.0);
        Self { markup_multiplier }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingResult {
    pub refined_price: f64,
    pub estimated_margin: f64,
}

/// Refines a cost into a retail price per spec S3: multiply by the
/// merchant's markup, then snap to the nearest `.99`-ending price, then
/// derive `estimated_margin = (retail - cost) / retail * 100`.
pub fn refine_price(cost: f64, config: &PricingConfig) -> PricingResult {
    let raw = (cost * config.markup_multiplier).max(0.0);
    let refined_price = round_to_nearest_99(raw);
    let estimated_margin = if refined_price > 0.0 { (refined_price - cost) / refined_price * 100.0 } else { 0.0 };
    PricingResult { refined_price, estimated_margin }
}

/// Snaps `x` to whichever `.99`-ending price (one dollar bracket below or
/// above) is numerically closer, the usual retail-psychology rounding.
fn round_to_nearest_99(x: f64) -> f64 {
    if x <= 0.99 {
        return 0.99;
    }
    let floor_dollar = x.floor();
    let lower = (floor_dollar - 1.0 + 0.99).max(0.99);
    let upper = floor_dollar + 0.99;
    if (x - lower).abs() <= (upper - x).abs() {
        lower
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_cost_and_snaps_to_99() {
        let result = refine_price(10.0, &PricingConfig { markup_multiplier: 2.0 });
        assert!((result.refined_price - 19.99).abs() < 1e-9, "{}", result.refined_price);
    }

    #[test]
    fn margin_reflects_refined_not_raw_price() {
        let result = refine_price(10.0, &PricingConfig { markup_multiplier: 2.0 });
        let expected = (result.refined_price - 10.0) / result.refined_price * 100.0;
        assert!((result.estimated_margin - expected).abs() < 1e-9);
    }

    #[test]
    fn rounds_down_when_closer_to_the_lower_99() {
        assert!((round_to_nearest_99(19.05) - 18.99).abs() < 1e-9);
    }

    #[test]
    fn rounds_up_when_closer_to_the_upper_99() {
        assert!((round_to_nearest_99(19.95) - 19.99).abs() < 1e-9);
    }

    #[test]
    fn tiny_costs_floor_at_99_cents() {
        assert_eq!(round_to_nearest_99(0.02), 0.99);
    }
}
