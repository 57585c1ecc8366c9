//! Fuzzy-match engine selection (spec §4.3.2): which of the two supplier
//! matching backends (`poflow_domain::FuzzyEngine`) a given save should run.
//!
//! Precedence, highest first: request-level override > merchant setting >
//! global flag > rollout-percentage (deterministic hash of `merchant_id`
//! mod 100) > default (Engine A). Grounded on `chem_policies`'s
//! `PropertySelectionPolicy` shape — a config struct plus one pure `select`
//! method, no I/O.

use poflow_domain::FuzzyEngine;
use sha2::{Digest, Sha256};
use std::env;

/// The two knobs in the Configuration Surface table that aren't
/// request/merchant-scoped (`FUZZY_MATCH_ENGINE`, `FUZZY_MATCH_ROLLOUT_PERCENT`).
#[derive(Debug, Clone, Copy)]
pub struct EngineSelectionConfig {
    /// `None` is the `auto` setting: fall through to rollout/default.
    pub global_flag: Option<FuzzyEngine>,
    /// 0..=100. Share of merchants (by deterministic hash bucket) routed to
    /// Engine B when no override/flag decides it first.
    pub rollout_percent: u8,
}

impl Default for EngineSelectionConfig {
    fn default() -> Self {
        Self { global_flag: None, rollout_percent: 0 }
    }
}

impl EngineSelectionConfig {
    pub fn from_env() -> Self {
        let global_flag = match env::var("FUZZY_MATCH_ENGINE").ok().as_deref() {
            Some("levenshtein") => Some(FuzzyEngine::A),
            Some("trigram") => Some(FuzzyEngine::B),
            _ => None,
        };
        let rollout_percent =
            env::var("FUZZY_MATCH_ROLLOUT_PERCENT").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
        Self { global_flag, rollout_percent }
    }
}

pub struct FuzzyEngineSelector {
    config: EngineSelectionConfig,
}

impl FuzzyEngineSelector {
    pub fn new(config: EngineSelectionConfig) -> Self {
        Self { config }
    }

    /// Resolves the engine to run for one supplier match (spec §4.3.2
    /// "selection logic"). `request_override` and `merchant_setting` are
    /// `None` when the caller/merchant hasn't pinned an engine explicitly.
    pub fn select(
        &self,
        request_override: Option<FuzzyEngine>,
        merchant_setting: Option<FuzzyEngine>,
        merchant_id: &str,
    ) -> FuzzyEngine {
        if let Some(engine) = request_override {
            return engine;
        }
        if let Some(engine) = merchant_setting {
            return engine;
        }
        if let Some(engine) = self.config.global_flag {
            return engine;
        }
        if self.config.rollout_percent > 0 && rollout_bucket(merchant_id) < self.config.rollout_percent as u64 {
            return FuzzyEngine::B;
        }
        FuzzyEngine::A
    }
}

/// Deterministic `merchant_id -> 0..100` bucket via SHA-256, so the same
/// merchant always lands on the same side of a rollout percentage without
/// any stored state.
fn rollout_bucket(merchant_id: &str) -> u64 {
    let digest = Sha256::digest(merchant_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_be_bytes(bytes) % 100
}
