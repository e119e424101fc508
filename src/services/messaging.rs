//! Message-bus seam for test-result metadata events.
//!
//! The producer itself (Kafka in the reference deployment) is an external
//! collaborator; the platform publishes through this trait. The tracing
//! implementation is the default wiring, the in-memory one backs tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(test)]
use tokio::sync::Mutex;
use uuid::Uuid;

/// Summary event published once per completed job, keyed by the job id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultMetadataMessage {
    pub job_id: Uuid,
    pub lob_id: String,
    pub team_id: String,
    pub status: String,
    pub total_tests: i32,
    pub tests_passed: i32,
    pub tests_failed: i32,
    pub tests_skipped: i32,
    pub duration_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, key: &str, message: &TestResultMetadataMessage) -> anyhow::Result<()>;
}

/// Publishes events to the tracing stream. Used when no bus is wired.
pub struct LogPublisher {
    topic: String,
}

impl LogPublisher {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into() }
    }
}

#[async_trait]
impl ResultPublisher for LogPublisher {
    async fn publish(&self, key: &str, message: &TestResultMetadataMessage) -> anyhow::Result<()> {
        let payload = serde_json::to_string(message)?;
        tracing::info!(topic = %self.topic, key, payload = %payload, "Result metadata published");
        Ok(())
    }
}

/// Captures published events for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryPublisher {
    pub published: Mutex<Vec<(String, TestResultMetadataMessage)>>,
}

#[cfg(test)]
impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl ResultPublisher for MemoryPublisher {
    async fn publish(&self, key: &str, message: &TestResultMetadataMessage) -> anyhow::Result<()> {
        self.published
            .lock()
            .await
            .push((key.to_string(), message.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_camel_case_keys() {
        let msg = TestResultMetadataMessage {
            job_id: Uuid::new_v4(),
            lob_id: "acme".to_string(),
            team_id: "pay".to_string(),
            status: "Succeeded".to_string(),
            total_tests: 2,
            tests_passed: 1,
            tests_failed: 1,
            tests_skipped: 0,
            duration_seconds: 1.7,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"totalTests\":2"));
        assert!(json.contains("\"testsPassed\":1"));
    }

    #[tokio::test]
    async fn memory_publisher_captures_events_by_key() {
        let publisher = MemoryPublisher::new();
        let msg = TestResultMetadataMessage {
            job_id: Uuid::new_v4(),
            lob_id: "acme".to_string(),
            team_id: "pay".to_string(),
            status: "Failed".to_string(),
            total_tests: 1,
            tests_passed: 0,
            tests_failed: 1,
            tests_skipped: 0,
            duration_seconds: 0.3,
            completed_at: Utc::now(),
        };
        publisher.publish(&msg.job_id.to_string(), &msg).await.unwrap();

        let published = publisher.published.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, msg.job_id.to_string());
        assert_eq!(published[0].1.tests_failed, 1);
    }
}
