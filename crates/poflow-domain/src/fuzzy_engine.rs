//! The two interchangeable supplier fuzzy-match backends (spec §4.3.2).
//!
//! The enum itself is neutral domain vocabulary shared by the crate that
//! executes a match (`poflow-persistence`) and the crate that decides which
//! one to run (`poflow-policies`) — keeping it here avoids those two crates
//! depending on each other just to agree on a tag.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuzzyEngine {
    /// In-process algorithmic comparison (Levenshtein ratio), O(N) scan.
    A,
    /// Database-backed trigram similarity, single indexed query.
    B,
}

impl FuzzyEngine {
    pub fn wire_name(self) -> &'static str {
        match self {
            FuzzyEngine::A => "levenshtein",
            FuzzyEngine::B => "trigram",
        }
    }

    pub fn from_wire_name(s: &str) -> Option<Self> {
        match s {
            "levenshtein" => Some(FuzzyEngine::A),
            "trigram" => Some(FuzzyEngine::B),
            _ => None,
        }
    }
}
