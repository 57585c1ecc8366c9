//! Trait seam for the key-value half of the KV/Progress Fabric (C1).
//!
//! Used by the orchestrator for idempotent-start locks and by the janitor
//! (C7) for stuck-workflow bookkeeping. TTL semantics are load-bearing: a
//! forgotten key must expire on its own, the same contract
//! `chem_persistence`'s connection warmup cache leans on for staleness.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[async_trait]
pub trait WorkflowMetadataStore: Send + Sync {
    async fn put(&self, key: &str, value: Value, ttl: Duration);
    async fn get(&self, key: &str) -> Option<Value>;
    async fn delete(&self, key: &str);

    /// Atomically sets `key` only if absent, returning `true` on success.
    /// Backs the idempotent-start lock (spec §4.2 "Idempotent Start").
    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> bool;
}
