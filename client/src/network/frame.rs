/// Binary frame codec for the conversation channel
///
/// Every WebSocket binary message carries exactly one frame:
///
/// ```text
/// +---------+---------------------------+
/// | tag (1) | payload (remaining bytes) |
/// +---------+---------------------------+
/// ```
///
/// There is no length prefix, checksum or version field. The payload length
/// is whatever remains of the message after the tag byte.

use crate::network::error::{CodecError, CodecResult};
use crate::network::messages::{
    AsrPayload, ErrorPayload, HandshakePayload, LlmPayload, StatusPayload, VadPayload,
};
use serde::Serialize;

/// Frame type tag (byte 0 of every message)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Client → server, JSON `{version}`
    Handshake,
    /// Client → server, encoded microphone chunk
    AudioIn,
    /// Server → client, raw PCM16LE mono
    AudioOut,
    /// Server → client, JSON `{text}`
    TextAsr,
    /// Server → client, JSON `{text, done}`
    TextLlm,
    /// Server → client, JSON `{event}`
    VadEvent,
    /// Server → client, JSON `{error}`
    Error,
    /// Server → client, JSON `{status}`
    Status,
    /// Tag not known to this client, kept for forward compatibility
    Unknown(u8),
}

impl FrameKind {
    /// Map a wire tag to a kind. Never fails: unknown tags become `Unknown`.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0x01 => Self::Handshake,
            0x02 => Self::AudioIn,
            0x03 => Self::AudioOut,
            0x04 => Self::TextAsr,
            0x05 => Self::TextLlm,
            0x06 => Self::VadEvent,
            0x07 => Self::Error,
            0x08 => Self::Status,
            other => Self::Unknown(other),
        }
    }

    /// The wire tag for this kind
    pub fn tag(self) -> u8 {
        match self {
            Self::Handshake => 0x01,
            Self::AudioIn => 0x02,
            Self::AudioOut => 0x03,
            Self::TextAsr => 0x04,
            Self::TextLlm => 0x05,
            Self::VadEvent => 0x06,
            Self::Error => 0x07,
            Self::Status => 0x08,
            Self::Unknown(tag) => tag,
        }
    }

    /// Name used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            Self::Handshake => "Handshake",
            Self::AudioIn => "AudioIn",
            Self::AudioOut => "AudioOut",
            Self::TextAsr => "TextAsr",
            Self::TextLlm => "TextLlm",
            Self::VadEvent => "VadEvent",
            Self::Error => "Error",
            Self::Status => "Status",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Whether the payload is binary audio rather than a JSON record
    pub fn is_audio(self) -> bool {
        matches!(self, Self::AudioIn | Self::AudioOut)
    }

    /// Whether this is a tag the client does not understand
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// One tagged unit of protocol data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type
    pub kind: FrameKind,
    /// Raw payload, interpretation depends on `kind`
    pub payload: Vec<u8>,
}

/// Concatenate the tag byte with `payload`. Output length is `1 + payload.len()`.
pub fn encode(kind: FrameKind, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(kind.tag());
    bytes.extend_from_slice(payload);
    bytes
}

/// Split a message into tag and payload
///
/// # Errors
/// Returns `CodecError::MalformedFrame` for an empty message.
pub fn decode(bytes: &[u8]) -> CodecResult<Frame> {
    let (&tag, payload) = bytes.split_first().ok_or(CodecError::MalformedFrame)?;

    Ok(Frame {
        kind: FrameKind::from_tag(tag),
        payload: payload.to_vec(),
    })
}

impl Frame {
    /// Create a frame from a kind and raw payload
    pub fn new(kind: FrameKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Create a frame whose payload is `record` serialized as JSON
    pub fn json<T: Serialize>(kind: FrameKind, record: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_vec(record)?))
    }

    /// Handshake frame declaring the client protocol version
    pub fn handshake(version: u32) -> Self {
        Self::structured(FrameKind::Handshake, &HandshakePayload { version })
    }

    /// Outbound microphone chunk
    pub fn audio_in(chunk: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::AudioIn, chunk)
    }

    /// Inbound synthesized speech (PCM16LE)
    pub fn audio_out(pcm: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::AudioOut, pcm)
    }

    /// Finalized user utterance
    pub fn asr(text: impl Into<String>) -> Self {
        Self::structured(FrameKind::TextAsr, &AsrPayload { text: text.into() })
    }

    /// Incremental assistant text
    pub fn llm(text: impl Into<String>, done: bool) -> Self {
        Self::structured(
            FrameKind::TextLlm,
            &LlmPayload {
                text: text.into(),
                done,
            },
        )
    }

    /// Voice-activity event (`speech_start` / `speech_end`)
    pub fn vad(event: impl Into<String>) -> Self {
        Self::structured(FrameKind::VadEvent, &VadPayload { event: event.into() })
    }

    /// Server-reported error
    pub fn error(message: impl Into<String>) -> Self {
        Self::structured(
            FrameKind::Error,
            &ErrorPayload {
                error: message.into(),
            },
        )
    }

    /// Server status token
    pub fn status(status: impl Into<String>) -> Self {
        Self::structured(
            FrameKind::Status,
            &StatusPayload {
                status: status.into(),
            },
        )
    }

    /// Encode this frame for the wire
    pub fn encode(&self) -> Vec<u8> {
        encode(self.kind, &self.payload)
    }

    /// Decode a wire message
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        decode(bytes)
    }

    /// Total encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        1 + self.payload.len()
    }

    // The payload records only hold strings, numbers and bools, which
    // serde_json always serializes.
    fn structured<T: Serialize>(kind: FrameKind, record: &T) -> Self {
        let payload = serde_json::to_vec(record).unwrap_or_default();
        Self::new(kind, payload)
    }
}
