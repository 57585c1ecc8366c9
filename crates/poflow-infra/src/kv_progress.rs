//! The in-process KV/Progress Fabric (C1): a `WorkflowMetadataStore` +
//! `ProgressPublisher` pair backed by `DashMap`, generalized from
//! `chem_core::event::store::InMemoryEventStore`'s "trait plus a plain
//! in-memory map" shape. The teacher's store is single-threaded and
//! unsynchronized by design (its `FlowEngine` never runs two stages at
//! once); this pipeline dispatches stages from a worker pool plus a
//! background tick, so the in-memory backend has to be genuinely
//! thread-safe rather than wrapped in a single outer `Mutex`.
//!
//! A production deployment swaps this for Redis (the KV half) and a
//! Redis/NATS pub-sub (the progress half) without touching
//! `poflow_core`'s trait seams.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use poflow_core::kv::WorkflowMetadataStore;
use poflow_core::progress_fabric::ProgressPublisher;
use poflow_domain::ProgressEvent;

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Capacity of each channel's broadcast buffer. A slow subscriber that falls
/// this far behind starts missing events — acceptable per spec §4.1
/// ("consumers must tolerate missed or out-of-order events").
const BROADCAST_CAPACITY: usize = 256;

pub struct InMemoryKvProgressFabric {
    kv: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<ProgressEvent>>,
}

impl InMemoryKvProgressFabric {
    pub fn new() -> Self {
        Self { kv: DashMap::new(), channels: DashMap::new() }
    }

    /// Drops expired keys. Called opportunistically on `get`/`set_if_absent`
    /// rather than run on a timer — this fabric has no background sweep, so
    /// a key that's never looked at again just sits there until the process
    /// that owns it exits. Fine for the lock/session keys this store holds,
    /// which are always read again before their TTL matters.
    fn sweep_if_expired(&self, key: &str) {
        let expired = self.kv.get(key).map(|e| Instant::now() >= e.expires_at).unwrap_or(false);
        if expired {
            self.kv.remove(key);
        }
    }
}

impl Default for InMemoryKvProgressFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowMetadataStore for InMemoryKvProgressFabric {
    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.kv.insert(key.to_string(), Entry { value, expires_at: Instant::now() + ttl });
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.sweep_if_expired(key);
        self.kv.get(key).map(|e| e.value.clone())
    }

    async fn delete(&self, key: &str) {
        self.kv.remove(key);
    }

    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> bool {
        self.sweep_if_expired(key);
        match self.kv.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry { value, expires_at: Instant::now() + ttl });
                true
            }
        }
    }
}

#[async_trait]
impl ProgressPublisher for InMemoryKvProgressFabric {
    async fn publish(&self, channel: &str, event: ProgressEvent) {
        if let Some(tx) = self.channels.get(channel) {
            // No subscribers is a normal, expected case (spec §4.1 is
            // fire-and-forget); `send` failing just means nobody's listening.
            let _ = tx.send(event);
        }
    }

    async fn subscribe(&self, channels: &[String]) -> mpsc::Receiver<ProgressEvent> {
        let (out_tx, out_rx) = mpsc::channel(BROADCAST_CAPACITY);

        for channel in channels {
            let tx = self
                .channels
                .entry(channel.clone())
                .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
                .clone();
            let mut rx = tx.subscribe();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    if out_tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
        }

        out_rx
    }
}

pub fn shared() -> Arc<InMemoryKvProgressFabric> {
    Arc::new(InMemoryKvProgressFabric::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poflow_domain::{ProgressEventType, StageTag};

    #[tokio::test]
    async fn set_if_absent_only_succeeds_once_until_deleted() {
        let fabric = InMemoryKvProgressFabric::new();
        assert!(fabric.set_if_absent("lock", serde_json::json!(1), Duration::from_secs(60)).await);
        assert!(!fabric.set_if_absent("lock", serde_json::json!(2), Duration::from_secs(60)).await);
        fabric.delete("lock").await;
        assert!(fabric.set_if_absent("lock", serde_json::json!(3), Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let fabric = InMemoryKvProgressFabric::new();
        fabric.put("k", serde_json::json!("v"), Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fabric.get("k").await, None);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let fabric = InMemoryKvProgressFabric::new();
        let mut rx = fabric.subscribe(&["merchant:m1:stage".to_string()]).await;

        let event = ProgressEvent::new(ProgressEventType::Stage, "wf1", StageTag::AiParsing, 10, chrono::Utc::now());
        fabric.publish("merchant:m1:stage", event.clone()).await;

        let received = rx.recv().await.expect("event delivered");
        assert_eq!(received.workflow_id, "wf1");
    }
}
