//! Error types for the log client adapter.

/// Errors reported by an [`EventLog`](crate::EventLog) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// The backend could not be reached at startup.
    #[error("failed to connect to log brokers: {0}")]
    Connect(String),

    /// The record was rejected or not committed after all retries.
    #[error("publish to {topic} failed: {detail}")]
    Publish { topic: String, detail: String },

    /// The record was not acknowledged within the configured bound.
    #[error("publish to {topic} not acknowledged within {timeout_ms} ms")]
    PublishTimeout { topic: String, timeout_ms: u64 },

    /// A tail could not be established.
    #[error("failed to open tail on {topic}: {detail}")]
    TailOpen { topic: String, detail: String },

    /// A transient consumer fault. The tail keeps running.
    #[error("consumer fault on {topic}: {detail}")]
    Consume { topic: String, detail: String },
}
