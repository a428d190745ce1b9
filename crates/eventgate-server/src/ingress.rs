//! Ingress relay: typed request body in, committed log record out.

use std::sync::Arc;

use eventgate_log::{EventLog, LogError, Placement};
use eventgate_types::{CodecError, Envelope, EventKind, EventPayload};
use thiserror::Error;

/// Failures on the ingress path. All of them reach the HTTP caller.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The body does not match the payload shape for the kind.
    #[error("{0}")]
    MalformedPayload(#[source] CodecError),

    /// The envelope could not be serialized.
    #[error("{0}")]
    EncodingFailure(#[source] CodecError),

    /// The log rejected the record or could not commit it after retries.
    #[error("{0}")]
    PublishFailure(#[source] LogError),

    /// The log did not acknowledge the record within the configured bound.
    #[error("{0}")]
    PublishTimeout(#[source] LogError),
}

/// A record that was committed to the log.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub placement: Placement,
    pub envelope: Envelope,
}

/// Wraps decoded payloads in envelopes and publishes them.
///
/// Holds no state besides the shared log handle, so it is cheap to clone
/// into every request task.
#[derive(Clone)]
pub struct Relay {
    log: Arc<dyn EventLog>,
}

impl Relay {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Decodes `body` as a `kind` payload, wraps it, and publishes it to the
    /// kind's topic.
    ///
    /// Identical requests are published again each time. They get the same
    /// id but a new timestamp and placement.
    ///
    /// # Errors
    ///
    /// See [`IngestError`]. A malformed body is rejected before anything is
    /// published.
    pub async fn ingest(&self, kind: EventKind, body: &[u8]) -> Result<Ingested, IngestError> {
        let payload = EventPayload::decode(kind, body).map_err(IngestError::MalformedPayload)?;
        let envelope = Envelope::new(payload);
        let bytes = envelope.encode().map_err(IngestError::EncodingFailure)?;

        let topic = kind.topic();
        let placement = self.log.publish(topic, &bytes).await.map_err(|e| {
            tracing::error!(topic, id = %envelope.id, error = %e, "failed to publish event");
            match e {
                LogError::PublishTimeout { .. } => IngestError::PublishTimeout(e),
                other => IngestError::PublishFailure(other),
            }
        })?;

        tracing::info!(
            topic,
            id = %envelope.id,
            partition = placement.partition,
            offset = placement.offset,
            "event published"
        );

        Ok(Ingested {
            placement,
            envelope,
        })
    }
}
