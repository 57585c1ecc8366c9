//! Trait seam for the progress/pub-sub half of the KV/Progress Fabric (C1).
//!
//! Kept deliberately thin — a single `publish`/`subscribe` pair — so an
//! in-memory implementation (this workspace, `poflow-infra`) and a future
//! Redis-backed one share the same contract. Mirrors the role
//! `chem_core::event::EventStore` plays for the teacher's engine, minus
//! replay: progress events are fire-and-forget, not sourced state.

use async_trait::async_trait;
use poflow_domain::ProgressEvent;
use tokio::sync::mpsc;

#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    /// Best-effort, non-blocking publish to a channel (spec §4.1). Channel
    /// names follow `poflow_domain::channel_name`.
    async fn publish(&self, channel: &str, event: ProgressEvent);

    /// Subscribes to a set of channels. The returned receiver yields events
    /// best-effort FIFO per publisher; consumers must tolerate missed or
    /// out-of-order events (spec §4.1 Ordering). Dropping the receiver
    /// cancels the subscription.
    async fn subscribe(&self, channels: &[String]) -> mpsc::Receiver<ProgressEvent>;
}
