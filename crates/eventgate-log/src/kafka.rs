//! Kafka-backed event log.
//!
//! Publishing goes through a single rdkafka `FutureProducer`, which is
//! thread-safe and shared by every caller. Records are only reported as
//! published once all in-sync replicas have acknowledged them (`acks=all`).
//!
//! Each tail gets its own `StreamConsumer` in a throwaway consumer group,
//! with every partition of the topic assigned at the log end. No offsets
//! are committed, so a restart always tails from the newest record again.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use crate::{EventLog, LogError, MessageStream, Placement, RawMessage, TailItem};

/// Connection and delivery settings for [`KafkaLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Bootstrap broker addresses (`host:port`).
    pub brokers: Vec<String>,
    /// Times a transiently failed send is retried before giving up.
    pub publish_retries: u32,
    /// Delay between send retries, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Bound on the startup and tail-open metadata fetches, in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long librdkafka may hold a record, retries included, before the
    /// publish fails. Covers records queued while no broker is reachable.
    pub delivery_timeout_ms: u64,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: vec!["kafka:9092".to_string()],
            publish_retries: 5,
            retry_backoff_ms: 100,
            connect_timeout_ms: 10_000,
            delivery_timeout_ms: 120_000,
        }
    }
}

impl KafkaSettings {
    fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    /// Producer configuration: strongest acknowledgment, bounded retries.
    ///
    /// A record that is neither acknowledged nor out of retries after
    /// `message.timeout.ms` fails with a publish error. Wrap the log in a
    /// [`TimeoutLog`](crate::TimeoutLog) for a tighter bound.
    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.bootstrap_servers())
            .set("acks", "all")
            .set("message.send.max.retries", self.publish_retries.to_string())
            .set("retry.backoff.ms", self.retry_backoff_ms.to_string())
            .set("message.timeout.ms", self.delivery_timeout_ms.to_string())
            .set("enable.idempotence", "false");
        config
    }

    fn tail_config(&self, topic: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.bootstrap_servers())
            .set(
                "group.id",
                format!("eventgate-tail-{topic}-{}", uuid::Uuid::new_v4()),
            )
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "latest");
        config
    }
}

/// An [`EventLog`] backed by a Kafka cluster.
pub struct KafkaLog {
    producer: FutureProducer,
    settings: KafkaSettings,
}

impl KafkaLog {
    /// Creates the producer and verifies that the cluster is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Connect`] if no brokers are configured, the
    /// producer cannot be created, or cluster metadata cannot be fetched
    /// within `connect_timeout_ms`.
    pub async fn connect(settings: KafkaSettings) -> Result<Self, LogError> {
        if settings.brokers.is_empty() {
            return Err(LogError::Connect("no brokers configured".to_string()));
        }

        let producer: FutureProducer = settings
            .producer_config()
            .create()
            .map_err(|e| LogError::Connect(format!("failed to create producer: {e}")))?;

        let probe = producer.clone();
        let timeout = Duration::from_millis(settings.connect_timeout_ms);
        let broker_count = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| LogError::Connect(format!("metadata probe join error: {e}")))?
        .map_err(|e| LogError::Connect(format!("failed to fetch cluster metadata: {e}")))?;

        tracing::info!(
            brokers = %settings.bootstrap_servers(),
            broker_count,
            "connected to kafka"
        );

        Ok(Self { producer, settings })
    }

}

impl std::fmt::Debug for KafkaLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaLog")
            .field("brokers", &self.settings.brokers)
            .finish()
    }
}

#[async_trait]
impl EventLog for KafkaLog {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<Placement, LogError> {
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);

        match self.producer.send(record, Timeout::Never).await {
            Ok((partition, offset)) => Ok(Placement { partition, offset }),
            Err((err, _)) => Err(LogError::Publish {
                topic: topic.to_string(),
                detail: err.to_string(),
            }),
        }
    }

    async fn open_tail(&self, topic: &str) -> Result<MessageStream, LogError> {
        let tail_open = |detail: String| LogError::TailOpen {
            topic: topic.to_string(),
            detail,
        };

        let consumer: StreamConsumer = self
            .settings
            .tail_config(topic)
            .create()
            .map_err(|e| tail_open(format!("failed to create consumer: {e}")))?;

        let name = topic.to_string();
        let timeout = Duration::from_millis(self.settings.connect_timeout_ms);
        let (consumer, partitions) = tokio::task::spawn_blocking(move || {
            let partitions = partitions_of(&consumer, &name, timeout);
            (consumer, partitions)
        })
        .await
        .map_err(|e| tail_open(format!("metadata fetch join error: {e}")))?;
        let partitions = partitions.map_err(tail_open)?;

        let mut assignment = TopicPartitionList::new();
        for &partition in &partitions {
            assignment
                .add_partition_offset(topic, partition, Offset::End)
                .map_err(|e| tail_open(e.to_string()))?;
        }
        consumer
            .assign(&assignment)
            .map_err(|e| tail_open(format!("failed to assign partitions: {e}")))?;

        tracing::debug!(
            topic,
            partitions = partitions.len(),
            "kafka tail assigned at log end"
        );

        let (tx, stream) = MessageStream::channel();
        let name = topic.to_string();
        let pump = tokio::spawn(async move {
            loop {
                let item = match consumer.recv().await {
                    Ok(message) => TailItem::Message(RawMessage {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    }),
                    Err(e) => TailItem::Fault(LogError::Consume {
                        topic: name.clone(),
                        detail: e.to_string(),
                    }),
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(stream.attach(pump))
    }
}

/// Looks up the partition ids of `topic`. Blocks on a metadata request.
fn partitions_of(
    consumer: &StreamConsumer,
    topic: &str,
    timeout: Duration,
) -> Result<Vec<i32>, String> {
    let metadata = consumer
        .fetch_metadata(Some(topic), timeout)
        .map_err(|e| format!("failed to fetch topic metadata: {e}"))?;

    let topic_metadata = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| "topic missing from metadata".to_string())?;
    if let Some(code) = topic_metadata.error() {
        return Err(RDKafkaErrorCode::from(code).to_string());
    }

    let partitions: Vec<i32> = topic_metadata.partitions().iter().map(|p| p.id()).collect();
    if partitions.is_empty() {
        return Err("topic has no partitions".to_string());
    }
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_waits_for_all_replicas() {
        let settings = KafkaSettings::default();
        let config = settings.producer_config();

        assert_eq!(config.get("acks"), Some("all"));
        assert_eq!(config.get("message.send.max.retries"), Some("5"));
        assert_eq!(config.get("message.timeout.ms"), Some("120000"));
        assert_eq!(config.get("bootstrap.servers"), Some("kafka:9092"));
    }

    #[test]
    fn delivery_timeout_is_finite_and_configurable() {
        let settings = KafkaSettings {
            delivery_timeout_ms: 15_000,
            ..Default::default()
        };
        let config = settings.producer_config();

        assert_eq!(config.get("message.timeout.ms"), Some("15000"));
        assert_ne!(KafkaSettings::default().delivery_timeout_ms, 0);
    }

    #[test]
    fn brokers_are_joined_for_bootstrap() {
        let settings = KafkaSettings {
            brokers: vec!["k1:9092".to_string(), "k2:9092".to_string()],
            ..Default::default()
        };
        assert_eq!(
            settings.producer_config().get("bootstrap.servers"),
            Some("k1:9092,k2:9092")
        );
    }

    #[test]
    fn tails_use_private_uncommitted_groups() {
        let settings = KafkaSettings::default();
        let first = settings.tail_config("movie-events");
        let second = settings.tail_config("movie-events");

        assert_eq!(first.get("enable.auto.commit"), Some("false"));
        assert_eq!(first.get("auto.offset.reset"), Some("latest"));
        let group = first.get("group.id").unwrap();
        assert!(group.starts_with("eventgate-tail-movie-events-"));
        assert_ne!(first.get("group.id"), second.get("group.id"));
    }

    #[tokio::test]
    async fn connect_rejects_empty_broker_list() {
        let settings = KafkaSettings {
            brokers: Vec::new(),
            ..Default::default()
        };
        let err = KafkaLog::connect(settings).await.unwrap_err();
        assert_eq!(err, LogError::Connect("no brokers configured".to_string()));
    }
}
