//! The generic event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CodecError, EventKind, EventPayload};

/// Wrapper that carries a typed domain payload plus identity metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// `"<kind>-<key>-<action or status>"`. Repeatable, not unique.
    pub id: String,
    /// Creation instant, assigned by the relay rather than the client.
    pub timestamp: DateTime<Utc>,
    /// Kind tag (`"type"`) and payload fields (`"payload"`).
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Envelope {
    /// Wraps `payload`, deriving the id and stamping the current time.
    pub fn new(payload: impl Into<EventPayload>) -> Self {
        Self::with_timestamp(payload, Utc::now())
    }

    /// Wraps `payload` with an explicit creation instant.
    pub fn with_timestamp(payload: impl Into<EventPayload>, timestamp: DateTime<Utc>) -> Self {
        let payload = payload.into();
        Self {
            id: payload.event_id(),
            timestamp,
            payload,
        }
    }

    /// Returns the envelope `type`.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Serializes the envelope to its wire encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails, which does not
    /// happen for well-typed payloads.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    /// Parses an envelope from its wire encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are not a valid envelope,
    /// including when `type` does not match the payload shape.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}
