/// Outbound audio chunk encoding
///
/// The server treats `AudioIn` payloads as opaque, so the encoder is a seam:
/// the default sends raw 16-bit little-endian PCM at the capture rate.

/// Turns one chunk of mono f32 samples into an `AudioIn` payload
pub trait AudioEncoder: Send + Sync {
    /// Encode one chunk; an empty result means nothing to send
    fn encode(&self, samples: &[f32]) -> Vec<u8>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Signed 16-bit little-endian PCM
#[derive(Debug, Clone, Copy, Default)]
pub struct Pcm16Encoder;

impl Pcm16Encoder {
    /// Convert f32 samples (range: -1.0 to 1.0) to i16, clamping out-of-range input
    pub fn to_i16(samples: &[f32]) -> Vec<i16> {
        samples
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect()
    }
}

impl AudioEncoder for Pcm16Encoder {
    fn encode(&self, samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in Self::to_i16(samples) {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    fn name(&self) -> &'static str {
        "pcm16le"
    }
}
