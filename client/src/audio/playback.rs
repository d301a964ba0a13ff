/// Playback of inbound synthesized speech
///
/// `AudioOut` payloads are mono PCM16LE at the stream rate (24 kHz by
/// default). Each payload becomes one buffer handed to the output sink,
/// which places it on the timeline according to the `PlaybackMode`.
///
/// The output device is opened lazily on the first buffer and reused
/// afterwards. It is owned by the pipeline, so it lives exactly as long as
/// the session that owns the pipeline.

use crate::audio::error::AudioResult;
use crate::audio::scheduler::PlaybackMode;
use crate::state::config::PlaybackConfig;
use tracing::{debug, info, warn};

/// Convert PCM16LE bytes to normalized f32 samples
///
/// Each sample maps to `s / 32768.0`, so the reachable range is
/// [-1.0, 0.99997]. A trailing odd byte is ignored.
///
/// # Example
/// ```
/// use wybe_lib::audio::playback::pcm16_to_f32;
///
/// let samples = pcm16_to_f32(&[0x00, 0x80, 0xFF, 0x7F]);
/// assert_eq!(samples[0], -1.0);
/// assert!((samples[1] - 0.99997).abs() < 1e-5);
/// ```
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// An open output accepting buffers at the stream rate
pub trait PlaybackSink: Send {
    /// Hand one buffer to the output
    ///
    /// # Returns
    /// `false` if the buffer was dropped (queue full or output gone)
    fn play(&mut self, samples: Vec<f32>) -> bool;
}

/// Opens playback sinks
pub trait PlaybackBackend: Send {
    /// Open the output described by `config`
    ///
    /// # Errors
    /// Device lookup, permission and stream errors.
    fn open(&mut self, config: &PlaybackConfig) -> AudioResult<Box<dyn PlaybackSink>>;
}

/// Owns the output for one session
pub struct PlaybackPipeline {
    backend: Box<dyn PlaybackBackend>,
    config: PlaybackConfig,
    sink: Option<Box<dyn PlaybackSink>>,
    played: u64,
    dropped: u64,
}

impl PlaybackPipeline {
    /// Create a pipeline; no device is opened yet
    pub fn new(backend: Box<dyn PlaybackBackend>, config: PlaybackConfig) -> Self {
        Self {
            backend,
            config,
            sink: None,
            played: 0,
            dropped: 0,
        }
    }

    /// Schedule one decoded buffer
    ///
    /// Opens the output on first use. If opening fails the error is
    /// returned and the next buffer tries again.
    ///
    /// # Errors
    /// The backend's open error.
    pub fn play(&mut self, samples: Vec<f32>) -> AudioResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        if self.sink.is_none() {
            info!(
                mode = %self.config.mode,
                rate = self.config.sample_rate,
                "Opening playback output"
            );
            self.sink = Some(self.backend.open(&self.config)?);
        }

        if let Some(sink) = self.sink.as_mut() {
            let len = samples.len();
            if sink.play(samples) {
                self.played += 1;
                debug!("Scheduled playback buffer #{} ({} samples)", self.played, len);
            } else {
                self.dropped += 1;
                warn!("Playback buffer dropped ({} so far)", self.dropped);
            }
        }

        Ok(())
    }

    /// Decode a PCM16LE payload and schedule it
    ///
    /// # Returns
    /// The decoded samples, whether or not the output could be opened
    pub fn play_pcm(&mut self, pcm: &[u8]) -> (Vec<f32>, AudioResult<()>) {
        let samples = pcm16_to_f32(pcm);
        let result = self.play(samples.clone());
        (samples, result)
    }

    /// Whether the output has been opened
    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Configured scheduling mode
    pub fn mode(&self) -> PlaybackMode {
        self.config.mode
    }

    /// Buffers handed to the output so far
    pub fn played(&self) -> u64 {
        self.played
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::error::AudioError;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_pcm_conversion_endpoints() {
        let samples = pcm16_to_f32(&[0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00]);

        assert_eq!(samples[0], -1.0);
        assert!((samples[1] - 0.999_969_5).abs() < 1e-6);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn test_pcm_conversion_ignores_odd_byte() {
        assert_eq!(pcm16_to_f32(&[0x00, 0x40, 0x12]), vec![0.5]);
        assert!(pcm16_to_f32(&[0x12]).is_empty());
    }

    struct RecordingSink(Arc<Mutex<Vec<Vec<f32>>>>);

    impl PlaybackSink for RecordingSink {
        fn play(&mut self, samples: Vec<f32>) -> bool {
            self.0.lock().unwrap().push(samples);
            true
        }
    }

    struct CountingBackend {
        opens: Arc<Mutex<u32>>,
        fail_first: bool,
        buffers: Arc<Mutex<Vec<Vec<f32>>>>,
    }

    impl PlaybackBackend for CountingBackend {
        fn open(&mut self, _config: &PlaybackConfig) -> AudioResult<Box<dyn PlaybackSink>> {
            let mut opens = self.opens.lock().unwrap();
            *opens += 1;
            if self.fail_first && *opens == 1 {
                return Err(AudioError::DeviceNotFound);
            }
            Ok(Box::new(RecordingSink(Arc::clone(&self.buffers))))
        }
    }

    #[test]
    fn test_output_opened_lazily_and_reused() {
        let opens = Arc::new(Mutex::new(0));
        let buffers = Arc::new(Mutex::new(Vec::new()));
        let backend = CountingBackend {
            opens: Arc::clone(&opens),
            fail_first: false,
            buffers: Arc::clone(&buffers),
        };

        let mut pipeline = PlaybackPipeline::new(Box::new(backend), PlaybackConfig::default());
        assert!(!pipeline.is_open());
        assert_eq!(*opens.lock().unwrap(), 0);

        pipeline.play(vec![0.1; 4]).unwrap();
        pipeline.play(vec![0.2; 4]).unwrap();

        assert!(pipeline.is_open());
        assert_eq!(*opens.lock().unwrap(), 1);
        assert_eq!(buffers.lock().unwrap().len(), 2);
        assert_eq!(pipeline.played(), 2);
    }

    #[test]
    fn test_failed_open_is_retried() {
        let opens = Arc::new(Mutex::new(0));
        let buffers = Arc::new(Mutex::new(Vec::new()));
        let backend = CountingBackend {
            opens: Arc::clone(&opens),
            fail_first: true,
            buffers: Arc::clone(&buffers),
        };

        let mut pipeline = PlaybackPipeline::new(Box::new(backend), PlaybackConfig::default());

        assert!(pipeline.play(vec![0.1; 4]).is_err());
        assert!(!pipeline.is_open());

        assert!(pipeline.play(vec![0.1; 4]).is_ok());
        assert!(pipeline.is_open());
        assert_eq!(*opens.lock().unwrap(), 2);
    }

    #[test]
    fn test_play_pcm_returns_samples() {
        let backend = CountingBackend {
            opens: Arc::new(Mutex::new(0)),
            fail_first: false,
            buffers: Arc::new(Mutex::new(Vec::new())),
        };
        let mut pipeline = PlaybackPipeline::new(Box::new(backend), PlaybackConfig::default());

        let (samples, result) = pipeline.play_pcm(&[0x00, 0x00, 0x00, 0xC0]);
        assert!(result.is_ok());
        assert_eq!(samples, vec![0.0, -0.5]);
    }

    #[test]
    fn test_empty_payload_does_not_open_output() {
        let opens = Arc::new(Mutex::new(0));
        let backend = CountingBackend {
            opens: Arc::clone(&opens),
            fail_first: false,
            buffers: Arc::new(Mutex::new(Vec::new())),
        };
        let mut pipeline = PlaybackPipeline::new(Box::new(backend), PlaybackConfig::default());

        pipeline.play(Vec::new()).unwrap();
        assert!(!pipeline.is_open());
        assert_eq!(*opens.lock().unwrap(), 0);
    }
}
