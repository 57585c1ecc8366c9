//! In-process stage-dispatch queue (spec §4.6/§4.9). Backed by a
//! `Mutex<VecDeque<QueueJob>>` rather than the `mpsc` channel the narrative
//! spec suggests: the Tick Dispatcher's backlog check needs `len()`, and
//! `tokio::sync::mpsc` doesn't expose one. A production deployment swaps
//! this for a real broker (SQS, Redis streams) behind the same `Queue`
//! trait; nothing upstream of it notices the difference.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use poflow_core::queue::{Queue, QueueJob};

pub struct InMemoryQueue {
    inner: Mutex<VecDeque<QueueJob>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::new()) }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, job: QueueJob) {
        self.inner.lock().await.push_back(job);
    }

    async fn try_dequeue(&self) -> Option<QueueJob> {
        self.inner.lock().await.pop_front()
    }

    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub fn shared() -> Arc<InMemoryQueue> {
    Arc::new(InMemoryQueue::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poflow_domain::StageTag;

    fn job(stage: StageTag) -> QueueJob {
        QueueJob {
            workflow_id: "wf_1".into(),
            merchant_id: "m_1".into(),
            upload_id: "up_1".into(),
            purchase_order_id: None,
            stage,
            data: serde_json::json!({}),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn fifo_order_and_len() {
        let queue = InMemoryQueue::new();
        queue.enqueue(job(StageTag::AiParsing)).await;
        queue.enqueue(job(StageTag::DatabaseSave)).await;
        assert_eq!(queue.len().await, 2);

        let first = queue.try_dequeue().await.unwrap();
        assert_eq!(first.stage, StageTag::AiParsing);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn dequeue_on_empty_queue_is_none() {
        let queue = InMemoryQueue::new();
        assert!(queue.try_dequeue().await.is_none());
    }
}
