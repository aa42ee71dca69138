//! Codec error types.

/// Failure to move a [`Document`](crate::Document) across the wire format.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The document could not be rendered as JSON text.
    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),

    /// The text is not a JSON document.
    #[error("failed to decode document: {0}")]
    Decode(#[source] serde_json::Error),
}
