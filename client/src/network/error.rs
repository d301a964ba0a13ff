/// Network error types for the conversation channel
///
/// This module defines error types used throughout the network layer,
/// including the frame codec.

use thiserror::Error;

/// Network-related errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to connect to server
    #[error("Failed to connect to server: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize message
    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Connection closed unexpectedly
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single frame could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Frame codec errors
///
/// Both variants are scoped to one frame: the offending frame is dropped
/// and the connection keeps running.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Zero-length message, there is no tag byte to read
    #[error("Malformed frame: empty message")]
    MalformedFrame,

    /// The payload of a structured frame is not the expected UTF-8 JSON record
    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Name of the frame kind whose payload failed to decode
        kind: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
