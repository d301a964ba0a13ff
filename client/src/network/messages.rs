/// Structured payload records carried inside frames
///
/// Text-bearing frames (`Handshake`, `TextAsr`, `TextLlm`, `VadEvent`,
/// `Error`, `Status`) carry a small UTF-8 JSON record. This module defines
/// those records and the typed `ServerMessage` view of an inbound frame.

use crate::network::error::{CodecError, CodecResult};
use crate::network::frame::{Frame, FrameKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// Payload records
// ============================================================================

/// Handshake record sent by the client right after the socket opens
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HandshakePayload {
    /// Client protocol version
    pub version: u32,
}

/// Finalized user utterance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AsrPayload {
    /// Transcribed text
    pub text: String,
}

/// Incremental assistant text
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LlmPayload {
    /// Text chunk (empty on the terminal frame)
    #[serde(default)]
    pub text: String,

    /// Whether the response is complete
    #[serde(default)]
    pub done: bool,
}

/// Voice-activity event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VadPayload {
    /// Event name (`speech_start`, `speech_end`)
    pub event: String,
}

/// Server-reported error
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    /// Human-readable message from the server
    pub error: String,
}

/// Server status token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusPayload {
    /// Status token (`ready`, `listening`, `thinking`, `speaking`, ...)
    pub status: String,
}

/// Decoded voice-activity event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VadEvent {
    /// Server detected the start of speech
    SpeechStart,
    /// Server detected the end of speech
    SpeechEnd,
    /// Any other event name
    Other(String),
}

impl VadEvent {
    /// Parse an event name
    pub fn parse(event: &str) -> Self {
        match event {
            "speech_start" => Self::SpeechStart,
            "speech_end" => Self::SpeechEnd,
            other => Self::Other(other.to_string()),
        }
    }
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Typed view of a server → client frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Raw PCM16LE speech samples
    AudioOut(Vec<u8>),

    /// Finalized user utterance
    Asr {
        /// Transcribed text
        text: String,
    },

    /// Incremental assistant generation
    Llm {
        /// Text chunk
        text: String,
        /// Terminal signal for this response
        done: bool,
    },

    /// Voice-activity event
    Vad(VadEvent),

    /// Server-reported error
    Error {
        /// Message supplied by the server
        message: String,
    },

    /// Status token
    Status {
        /// Token exactly as sent
        status: String,
    },
}

impl ServerMessage {
    /// Interpret a decoded frame
    ///
    /// # Returns
    /// * `Ok(Some(message))` - a server → client frame
    /// * `Ok(None)` - a kind the client never receives (`Handshake`,
    ///   `AudioIn`) or an `Unknown` tag; the caller ignores it
    ///
    /// # Errors
    /// Returns `CodecError::InvalidPayload` when a structured payload is not
    /// the expected JSON record. The error applies to this frame only.
    pub fn from_frame(frame: &Frame) -> CodecResult<Option<Self>> {
        let message = match frame.kind {
            FrameKind::AudioOut => Self::AudioOut(frame.payload.clone()),
            FrameKind::TextAsr => {
                let record: AsrPayload = parse_record(frame)?;
                Self::Asr { text: record.text }
            }
            FrameKind::TextLlm => {
                let record: LlmPayload = parse_record(frame)?;
                Self::Llm {
                    text: record.text,
                    done: record.done,
                }
            }
            FrameKind::VadEvent => {
                let record: VadPayload = parse_record(frame)?;
                Self::Vad(VadEvent::parse(&record.event))
            }
            FrameKind::Error => {
                let record: ErrorPayload = parse_record(frame)?;
                Self::Error {
                    message: record.error,
                }
            }
            FrameKind::Status => {
                let record: StatusPayload = parse_record(frame)?;
                Self::Status {
                    status: record.status,
                }
            }
            FrameKind::Handshake | FrameKind::AudioIn | FrameKind::Unknown(_) => return Ok(None),
        };

        Ok(Some(message))
    }

    /// Whether this message carries audio
    pub fn is_audio(&self) -> bool {
        matches!(self, ServerMessage::AudioOut(_))
    }

    /// Get the text if this is a transcript message
    pub fn text(&self) -> Option<&str> {
        match self {
            ServerMessage::Asr { text } => Some(text),
            ServerMessage::Llm { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Get the error message if this is an error
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ServerMessage::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Decode the JSON record of a structured frame
pub fn parse_record<T: DeserializeOwned>(frame: &Frame) -> CodecResult<T> {
    serde_json::from_slice(&frame.payload).map_err(|source| CodecError::InvalidPayload {
        kind: frame.kind.name(),
        source,
    })
}
