/// Playback buffer hand-off to the output callback
pub mod buffer;

/// Microphone capture
pub mod capture;

/// Audio device enumeration and lookup
pub mod device;

/// Outbound chunk encoding
pub mod encoder;

/// Audio-related error types
pub mod error;

/// cpal speaker output
pub mod output;

/// Capture pipeline: microphone to `AudioIn` frames
pub mod pipeline;

/// Playback pipeline: `AudioOut` payloads to the speaker
pub mod playback;

/// Audio resampling
pub mod resampler;

/// Playback buffer scheduling and mixing
pub mod scheduler;

// Re-export commonly used types
pub use capture::{AudioCapture, CaptureSource};
pub use device::{list_input_devices, list_output_devices, AudioDevice, DeviceDirection};
pub use encoder::{AudioEncoder, Pcm16Encoder};
pub use error::{AudioError, AudioResult};
pub use output::CpalPlayback;
pub use pipeline::{CaptureEnded, CapturePipeline};
pub use playback::{pcm16_to_f32, PlaybackBackend, PlaybackPipeline, PlaybackSink};
pub use resampler::AudioResampler;
pub use scheduler::{PlaybackMode, PlaybackScheduler};
