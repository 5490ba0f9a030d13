//! Error types for message encoding and decoding

use thiserror::Error;

/// Result type for message operations
pub type MessageResult<T> = Result<T, MessageError>;

/// Errors that can occur while converting messages to and from the wire
#[derive(Debug, Error)]
pub enum MessageError {
    /// Payload is not valid JSON or does not match any message shape
    #[error("malformed message payload: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize a message
    #[error("failed to encode message: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    /// Event payload without a textual `args.type` tag
    #[error("event is missing its type tag")]
    MissingEventType,
}
