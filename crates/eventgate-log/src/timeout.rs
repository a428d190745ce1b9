//! Upper bound on publish acknowledgment latency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{EventLog, LogError, MessageStream, Placement};

/// Wraps another [`EventLog`] and fails publishes that are not acknowledged
/// in time.
///
/// The timed-out publish may still be committed by the broker later.
/// Callers only learn that it was not confirmed. Tails pass through
/// unchanged.
pub struct TimeoutLog {
    inner: Arc<dyn EventLog>,
    timeout: Duration,
}

impl TimeoutLog {
    pub fn new(inner: Arc<dyn EventLog>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl EventLog for TimeoutLog {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<Placement, LogError> {
        match tokio::time::timeout(self.timeout, self.inner.publish(topic, payload)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    topic,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "publish acknowledgment timed out"
                );
                Err(LogError::PublishTimeout {
                    topic: topic.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn open_tail(&self, topic: &str) -> Result<MessageStream, LogError> {
        self.inner.open_tail(topic).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLog;

    #[tokio::test(start_paused = true)]
    async fn stalled_publish_times_out() {
        let memory = Arc::new(MemoryLog::new());
        memory.stall_publishes(true);
        let log = TimeoutLog::new(memory.clone(), Duration::from_millis(250));

        let err = log.publish("payment-events", b"p").await.unwrap_err();
        assert_eq!(
            err,
            LogError::PublishTimeout {
                topic: "payment-events".to_string(),
                timeout_ms: 250,
            }
        );
        assert_eq!(memory.publish_calls(), 1);
    }

    #[tokio::test]
    async fn acknowledged_publish_passes_through() {
        let memory = Arc::new(MemoryLog::new());
        let log = TimeoutLog::new(memory, Duration::from_secs(5));

        let placement = log.publish("movie-events", b"m").await.unwrap();
        assert_eq!(placement, Placement { partition: 0, offset: 0 });
    }

    #[tokio::test]
    async fn inner_errors_are_not_rewritten() {
        let memory = Arc::new(MemoryLog::new());
        memory.fail_publishes(Some("message too large"));
        let log = TimeoutLog::new(memory, Duration::from_secs(5));

        let err = log.publish("movie-events", b"m").await.unwrap_err();
        assert!(matches!(err, LogError::Publish { .. }));
    }
}
