/// Audio processing modules
pub mod audio;

/// Conversation channel: frame codec and connection management
pub mod network;

/// Conversation session driver
pub mod session;

/// Session state machine and configuration
pub mod state;

/// Utility modules
pub mod utils;
