use thiserror::Error;

/// Audio-related errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// No matching audio device found
    #[error("No audio device found")]
    DeviceNotFound,

    /// The platform or user refused access to the device
    #[error("Audio device access denied: {0}")]
    PermissionDenied(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildFailed(String),

    /// Audio stream error
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// The device offers no usable stream configuration
    #[error("Unsupported audio configuration: {0}")]
    UnsupportedConfig(String),

    /// Resampling failed
    #[error("Resampling failed: {0}")]
    ResampleFailed(String),

    /// Device name is invalid
    #[error("Device name is invalid UTF-8")]
    InvalidDeviceName,

    /// Failed to get device configuration
    #[error("Failed to get device configuration: {0}")]
    ConfigError(String),

    /// cpal error
    #[error("cpal error: {0}")]
    CpalError(#[from] cpal::DevicesError),

    /// Default config error
    #[error("Default config error: {0}")]
    DefaultConfigError(#[from] cpal::DefaultStreamConfigError),

    /// Supported config error
    #[error("Supported config error: {0}")]
    SupportedConfigError(#[from] cpal::SupportedStreamConfigsError),
}

impl AudioError {
    /// Map a stream build failure, keeping access refusals distinct
    pub fn from_build_error(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::PermissionDenied("device not available".to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported => {
                AudioError::UnsupportedConfig("stream config not supported".to_string())
            }
            other => AudioError::StreamBuildFailed(other.to_string()),
        }
    }

    /// Map a play failure, keeping access refusals distinct
    pub fn from_play_error(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => {
                AudioError::PermissionDenied("device not available".to_string())
            }
            other => AudioError::StreamError(other.to_string()),
        }
    }

    /// Whether this error means the device was refused
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AudioError::PermissionDenied(_))
    }
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
