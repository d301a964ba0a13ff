use crate::audio::error::{AudioError, AudioResult};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{debug, info};

/// Mono sample-rate converter
///
/// Used on both media paths: microphone blocks are converted to the capture
/// rate before chunking, and inbound speech is converted from the stream
/// rate to whatever rate the output device opened at.
///
/// rubato works on fixed 10 ms input chunks, so `push` keeps the remainder
/// of every call and carries it into the next one.
pub struct AudioResampler {
    resampler: SincFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    /// Samples waiting for a full input chunk
    pending: Vec<f32>,
    input_rate: u32,
    output_rate: u32,
    chunk_size: usize,
}

impl AudioResampler {
    /// Create a new mono resampler
    ///
    /// # Errors
    /// Returns `AudioError::ResampleFailed` for a zero rate or if rubato
    /// rejects the ratio.
    ///
    /// # Example
    /// ```
    /// use wybe_lib::audio::resampler::AudioResampler;
    ///
    /// // Microphone at 48 kHz, capture stream at 16 kHz
    /// let resampler = AudioResampler::new(48000, 16000).unwrap();
    /// assert_eq!(resampler.chunk_size(), 480);
    /// ```
    pub fn new(input_rate: u32, output_rate: u32) -> AudioResult<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(AudioError::ResampleFailed(format!(
                "Invalid rates: {} Hz -> {} Hz",
                input_rate, output_rate
            )));
        }

        info!("Creating resampler: {} Hz -> {} Hz", input_rate, output_rate);

        let ratio = output_rate as f64 / input_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // 10ms of input per process call
        let chunk_size = (input_rate / 100).max(1) as usize;

        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
            .map_err(|e| AudioError::ResampleFailed(format!("Failed to create resampler: {}", e)))?;

        let input_buffer = resampler.input_buffer_allocate(true);
        let output_buffer = resampler.output_buffer_allocate(true);

        debug!(
            "Resampler ready: ratio={:.4}, chunk_size={}, output_max={}",
            ratio,
            chunk_size,
            resampler.output_frames_max()
        );

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            pending: Vec::with_capacity(chunk_size * 2),
            input_rate,
            output_rate,
            chunk_size,
        })
    }

    /// Convert exactly one input chunk
    ///
    /// # Errors
    /// Returns `AudioError::ResampleFailed` if `input` is not `chunk_size` long.
    pub fn process(&mut self, input: &[f32]) -> AudioResult<Vec<f32>> {
        if input.len() != self.chunk_size {
            return Err(AudioError::ResampleFailed(format!(
                "Input size mismatch: expected {} samples, got {}",
                self.chunk_size,
                input.len()
            )));
        }

        self.input_buffer[0].copy_from_slice(input);

        let (_, produced) = self
            .resampler
            .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
            .map_err(|e| AudioError::ResampleFailed(format!("Resampling failed: {}", e)))?;

        Ok(self.output_buffer[0][..produced].to_vec())
    }

    /// Convert a block of any length
    ///
    /// Returns whatever full chunks produced; may be empty while the first
    /// 10 ms accumulate.
    pub fn push(&mut self, input: &[f32]) -> AudioResult<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        let mut offset = 0;

        while self.pending.len() - offset >= self.chunk_size {
            self.input_buffer[0].copy_from_slice(&self.pending[offset..offset + self.chunk_size]);
            offset += self.chunk_size;

            let (_, produced) = self
                .resampler
                .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
                .map_err(|e| AudioError::ResampleFailed(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&self.output_buffer[0][..produced]);
        }

        self.pending.drain(..offset);
        Ok(output)
    }

    /// Drop buffered input and filter state
    pub fn reset(&mut self) {
        debug!("Resetting resampler");
        self.resampler.reset();
        self.pending.clear();
    }

    /// Get the input sample rate
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Get the output sample rate
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Number of input samples per `process` call
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Samples held back until the next full chunk
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
