//! In-process partitioned log.
//!
//! Records live in memory and are lost on exit. Tails are fed through a
//! per-topic broadcast channel. The failure switches make the adapter's
//! error paths reproducible without a broker.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{EventLog, LogError, MessageStream, Placement, RawMessage, TailItem};

/// Capacity of each topic's live feed. Slower tails observe a fault.
const FEED_CAPACITY: usize = 1024;

struct TopicState {
    partitions: Vec<Vec<Vec<u8>>>,
    next_partition: usize,
    feed: broadcast::Sender<TailItem>,
}

impl TopicState {
    fn new(partitions: usize) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            partitions: vec![Vec::new(); partitions],
            next_partition: 0,
            feed,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    topics: HashMap<String, TopicState>,
    publish_calls: u64,
    publish_failure: Option<String>,
    stall_publishes: bool,
    refused_tails: HashSet<String>,
}

/// An [`EventLog`] held entirely in process memory.
///
/// Records are spread round-robin over a fixed number of partitions per
/// topic. Offsets start at 0 within each partition. Topics are created on
/// first use.
pub struct MemoryLog {
    partitions: usize,
    state: Mutex<MemoryState>,
}

impl MemoryLog {
    /// Creates a log with one partition per topic.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// Creates a log with `partitions` partitions per topic (at least one).
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, String> {
        self.state
            .lock()
            .map_err(|_| "memory log lock poisoned".to_string())
    }

    /// Makes every later publish fail with `detail`. `None` clears it.
    pub fn fail_publishes(&self, detail: Option<&str>) {
        if let Ok(mut state) = self.lock() {
            state.publish_failure = detail.map(str::to_string);
        }
    }

    /// Makes every later publish wait forever for an acknowledgment.
    pub fn stall_publishes(&self, stall: bool) {
        if let Ok(mut state) = self.lock() {
            state.stall_publishes = stall;
        }
    }

    /// Makes later `open_tail` calls on `topic` fail.
    pub fn refuse_tail(&self, topic: &str) {
        if let Ok(mut state) = self.lock() {
            state.refused_tails.insert(topic.to_string());
        }
    }

    /// Delivers a consumer fault to every open tail on `topic`.
    pub fn inject_fault(&self, topic: &str, detail: &str) {
        if let Ok(mut state) = self.lock() {
            let partitions = self.partitions;
            let topic_state = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::new(partitions));
            let _ = topic_state.feed.send(TailItem::Fault(LogError::Consume {
                topic: topic.to_string(),
                detail: detail.to_string(),
            }));
        }
    }

    /// Delivers raw bytes to every open tail on `topic` without storing them.
    ///
    /// Used to feed tails with records that did not come through
    /// [`EventLog::publish`], such as foreign or corrupt producers.
    pub fn inject_raw(&self, topic: &str, payload: &[u8]) {
        if let Ok(mut state) = self.lock() {
            let partitions = self.partitions;
            let topic_state = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::new(partitions));
            let _ = topic_state.feed.send(TailItem::Message(RawMessage {
                topic: topic.to_string(),
                partition: 0,
                offset: -1,
                payload: payload.to_vec(),
            }));
        }
    }

    /// Number of `publish` calls so far, successful or not.
    pub fn publish_calls(&self) -> u64 {
        self.lock().map(|state| state.publish_calls).unwrap_or(0)
    }

    /// Every stored record on `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<Vec<u8>> {
        self.lock()
            .ok()
            .and_then(|state| {
                state
                    .topics
                    .get(topic)
                    .map(|t| t.partitions.iter().flatten().cloned().collect())
            })
            .unwrap_or_default()
    }

    fn append(&self, topic: &str, payload: &[u8]) -> Result<Option<Placement>, String> {
        let mut state = self.lock()?;
        state.publish_calls += 1;

        if let Some(detail) = &state.publish_failure {
            return Err(detail.clone());
        }
        if state.stall_publishes {
            return Ok(None);
        }

        let partitions = self.partitions;
        let topic_state = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicState::new(partitions));

        let partition = topic_state.next_partition;
        topic_state.next_partition = (partition + 1) % topic_state.partitions.len();
        let records = &mut topic_state.partitions[partition];
        let placement = Placement {
            partition: partition as i32,
            offset: records.len() as i64,
        };
        records.push(payload.to_vec());

        // No receivers simply means nobody is tailing yet.
        let _ = topic_state.feed.send(TailItem::Message(RawMessage {
            topic: topic.to_string(),
            partition: placement.partition,
            offset: placement.offset,
            payload: payload.to_vec(),
        }));

        Ok(Some(placement))
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLog")
            .field("partitions", &self.partitions)
            .finish()
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<Placement, LogError> {
        match self.append(topic, payload) {
            Ok(Some(placement)) => Ok(placement),
            Ok(None) => std::future::pending().await,
            Err(detail) => Err(LogError::Publish {
                topic: topic.to_string(),
                detail,
            }),
        }
    }

    async fn open_tail(&self, topic: &str) -> Result<MessageStream, LogError> {
        let mut feed = {
            let mut state = self.lock().map_err(|detail| LogError::TailOpen {
                topic: topic.to_string(),
                detail,
            })?;
            if state.refused_tails.contains(topic) {
                return Err(LogError::TailOpen {
                    topic: topic.to_string(),
                    detail: "tail refused".to_string(),
                });
            }
            let partitions = self.partitions;
            state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState::new(partitions))
                .feed
                .subscribe()
        };

        let (tx, stream) = MessageStream::channel();
        let name = topic.to_string();
        let pump = tokio::spawn(async move {
            loop {
                let item = match feed.recv().await {
                    Ok(item) => item,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        TailItem::Fault(LogError::Consume {
                            topic: name.clone(),
                            detail: format!("tail lagged, {skipped} records skipped"),
                        })
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(stream.attach(pump))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn next_message(stream: &mut MessageStream) -> RawMessage {
        match tokio::time::timeout(Duration::from_secs(1), stream.recv()).await {
            Ok(Some(TailItem::Message(message))) => message,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn offsets_increase_per_partition() {
        let log = MemoryLog::new();
        let first = log.publish("movie-events", b"a").await.unwrap();
        let second = log.publish("movie-events", b"b").await.unwrap();
        let other = log.publish("user-events", b"c").await.unwrap();

        assert_eq!(first, Placement { partition: 0, offset: 0 });
        assert_eq!(second, Placement { partition: 0, offset: 1 });
        assert_eq!(other, Placement { partition: 0, offset: 0 });
        assert_eq!(log.publish_calls(), 3);
        assert_eq!(log.records("movie-events"), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn partitions_are_filled_round_robin() {
        let log = MemoryLog::with_partitions(2);
        let a = log.publish("payment-events", b"a").await.unwrap();
        let b = log.publish("payment-events", b"b").await.unwrap();
        let c = log.publish("payment-events", b"c").await.unwrap();

        assert_eq!((a.partition, a.offset), (0, 0));
        assert_eq!((b.partition, b.offset), (1, 0));
        assert_eq!((c.partition, c.offset), (0, 1));
    }

    #[tokio::test]
    async fn injected_failure_is_reported_and_counted() {
        let log = MemoryLog::new();
        log.fail_publishes(Some("leader not available"));

        let err = log.publish("movie-events", b"x").await.unwrap_err();
        assert_eq!(
            err,
            LogError::Publish {
                topic: "movie-events".to_string(),
                detail: "leader not available".to_string(),
            }
        );
        assert_eq!(log.publish_calls(), 1);
        assert!(log.records("movie-events").is_empty());

        log.fail_publishes(None);
        assert!(log.publish("movie-events", b"x").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_publish_never_completes() {
        let log = MemoryLog::new();
        log.stall_publishes(true);

        let outcome =
            tokio::time::timeout(Duration::from_secs(60), log.publish("user-events", b"x")).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn tail_starts_at_newest_offset() {
        let log = MemoryLog::new();
        log.publish("movie-events", b"before").await.unwrap();

        let mut tail = log.open_tail("movie-events").await.unwrap();
        log.publish("movie-events", b"after").await.unwrap();

        let message = next_message(&mut tail).await;
        assert_eq!(message.payload, b"after");
        assert_eq!(message.offset, 1);
    }

    #[tokio::test]
    async fn tails_are_independent_per_topic() {
        let log = Arc::new(MemoryLog::new());
        let mut movies = log.open_tail("movie-events").await.unwrap();
        let mut users = log.open_tail("user-events").await.unwrap();

        log.publish("user-events", b"u").await.unwrap();
        log.publish("movie-events", b"m").await.unwrap();

        assert_eq!(next_message(&mut movies).await.payload, b"m");
        assert_eq!(next_message(&mut users).await.payload, b"u");
    }

    #[tokio::test]
    async fn faults_do_not_end_the_tail() {
        let log = MemoryLog::new();
        let mut tail = log.open_tail("payment-events").await.unwrap();

        log.inject_fault("payment-events", "offset out of range");
        log.publish("payment-events", b"p").await.unwrap();

        match tail.recv().await {
            Some(TailItem::Fault(LogError::Consume { detail, .. })) => {
                assert_eq!(detail, "offset out of range");
            }
            other => panic!("expected a fault, got {other:?}"),
        }
        assert_eq!(next_message(&mut tail).await.payload, b"p");
    }

    #[tokio::test]
    async fn refused_tail_fails_to_open() {
        let log = MemoryLog::new();
        log.refuse_tail("user-events");

        let err = log.open_tail("user-events").await.unwrap_err();
        assert!(matches!(err, LogError::TailOpen { .. }));
        assert!(log.open_tail("movie-events").await.is_ok());
    }

    #[tokio::test]
    async fn raw_injection_reaches_tails_but_is_not_stored() {
        let log = MemoryLog::new();
        let mut tail = log.open_tail("movie-events").await.unwrap();

        log.inject_raw("movie-events", b"\xff\xfe");

        assert_eq!(next_message(&mut tail).await.payload, b"\xff\xfe");
        assert!(log.records("movie-events").is_empty());
    }
}
