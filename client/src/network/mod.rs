/// Network communication and WebSocket handling
///
/// This module provides the binary frame codec and the connection manager
/// for the conversation channel.

/// WebSocket connection management
pub mod connection;

/// Network error types
pub mod error;

/// Binary frame codec
pub mod frame;

/// Structured payload records and typed server messages
pub mod messages;

/// Async pumps for concurrent send/receive operations
pub mod tasks;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionState,
    FrameSender, ReconnectPolicy, WsReader, WsWriter,
};
pub use error::{CodecError, CodecResult, NetworkError, NetworkResult};
pub use frame::{decode, encode, Frame, FrameKind};
pub use messages::{ServerMessage, VadEvent};
