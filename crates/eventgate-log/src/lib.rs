//! Durable log client adapter for eventgate.
//!
//! Everything that talks to the partitioned log goes through the
//! [`EventLog`] trait. The relay publishes through it and the dispatcher
//! tails through it. Broker connection, acknowledgment and retry mechanics
//! stay behind the trait.
//!
//! # Implementations
//!
//! | Type | Backing | Use |
//! |------|---------|-----|
//! | [`KafkaLog`] | Kafka via `rdkafka` | production |
//! | [`MemoryLog`] | in-process partitions | local runs and tests |
//! | [`TimeoutLog`] | wraps another log | bounds publish latency |
//!
//! Every implementation is `Send + Sync`, and `publish` may be called from
//! many tasks at once. Callers share one instance as `Arc<dyn EventLog>`.

mod error;
mod kafka;
mod memory;
mod stream;
mod timeout;

pub use error::LogError;
pub use kafka::{KafkaLog, KafkaSettings};
pub use memory::MemoryLog;
pub use stream::{MessageStream, RawMessage, TailItem};
pub use timeout::TimeoutLog;

use async_trait::async_trait;

/// Where a published record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub partition: i32,
    pub offset: i64,
}

/// An append-only, partitioned log service.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends `payload` to `topic`.
    ///
    /// Returns only after the backend's durability acknowledgment. Transient
    /// failures are retried internally, and the error is final.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<Placement, LogError>;

    /// Opens a live tail on `topic`, positioned at the newest offset.
    ///
    /// Records appended before this call are not observed.
    async fn open_tail(&self, topic: &str) -> Result<MessageStream, LogError>;
}
