//! Error types for envelope and payload encoding.

/// Errors produced while converting events to or from their byte encoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input bytes do not match the expected shape.
    #[error("{0}")]
    Decode(#[source] serde_json::Error),

    /// A value could not be serialized.
    #[error("event encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}
