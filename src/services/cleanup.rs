//! Cleanup fan-out queue.
//!
//! Workload teardown requests go through this seam rather than being
//! executed inline; an external queue can replace the in-process channel
//! at the composition root, which is also where any retry policy lives.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A request to tear down a finished cluster workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRequest {
    pub job_name: String,
    pub lob_id: String,
}

#[async_trait]
pub trait CleanupQueue: Send + Sync {
    async fn enqueue(&self, request: CleanupRequest) -> anyhow::Result<()>;
}

/// In-process queue over an unbounded channel, drained by a worker.
pub struct MpscCleanupQueue {
    tx: mpsc::UnboundedSender<CleanupRequest>,
}

impl MpscCleanupQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CleanupRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CleanupQueue for MpscCleanupQueue {
    async fn enqueue(&self, request: CleanupRequest) -> anyhow::Result<()> {
        self.tx
            .send(request)
            .map_err(|_| anyhow::anyhow!("cleanup queue closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueued_requests_reach_the_receiver() {
        let (queue, mut rx) = MpscCleanupQueue::new();
        let req = CleanupRequest {
            job_name: "test-job-abc".to_string(),
            lob_id: "acme".to_string(),
        };
        queue.enqueue(req.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(req));
    }
}
