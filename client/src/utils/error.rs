//! 全局错误处理模块
//!
//! 提供统一的应用错误类型和用户友好的错误消息
//!
//! # 功能
//!
//! - 统一的 `AppError` 类型，聚合所有模块错误
//! - 用户友好的错误消息（不泄露原始协议错误）
//! - 错误代码用于展示层处理
//! - 错误恢复建议
//!
//! # 使用示例
//!
//! ```
//! use wybe_lib::audio::AudioError;
//! use wybe_lib::utils::error::{AppError, ErrorCode};
//!
//! let err = AppError::from(AudioError::PermissionDenied("denied".to_string()));
//! assert_eq!(err.code(), ErrorCode::AudioPermissionDenied);
//! assert_eq!(err.user_message(), "Microphone denied");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::error::AudioError;
use crate::network::error::{CodecError, NetworkError};
use crate::session::SessionError;
use crate::state::config::ConfigError;
use crate::state::{StateError, StatusError};

/// 应用错误类型
///
/// 聚合所有模块的错误类型，提供统一的错误处理接口
#[derive(Error, Debug)]
pub enum AppError {
    /// 音频错误
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// 网络错误
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// 帧编解码错误
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 会话错误
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// 状态错误
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 错误代码
///
/// 用于展示层识别和处理特定错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 音频错误
    /// 找不到音频设备
    AudioDeviceNotFound,
    /// 麦克风访问被拒绝
    AudioPermissionDenied,
    /// 音频流错误
    AudioStreamError,
    /// 重采样失败
    AudioResampleFailed,

    // 网络错误
    /// 连接失败
    NetworkConnectionFailed,
    /// 连接超时
    NetworkTimeout,
    /// 连接断开
    NetworkClosed,
    /// 配置无效
    NetworkInvalidConfig,

    // 帧错误
    /// 帧格式错误
    FrameMalformed,
    /// 帧载荷无效
    FrameInvalidPayload,

    // 配置错误
    /// 配置加载失败
    ConfigLoadFailed,
    /// 配置无效
    ConfigInvalid,

    // 会话错误
    /// 未连接时无法采集
    SessionCaptureDisabled,
    /// 采集已在运行
    SessionAlreadyRunning,
    /// 采集未运行
    SessionNotRunning,
    /// 会话已结束
    SessionClosed,

    // 通用错误
    /// 内部错误
    InternalError,
}

/// 错误上下文信息
///
/// 提供用户友好的错误信息和恢复建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// 错误代码
    pub code: ErrorCode,
    /// 用户友好的错误消息
    pub message: String,
    /// 详细错误信息（用于日志）
    pub detail: Option<String>,
    /// 恢复建议
    pub recovery_hint: Option<String>,
    /// 是否可恢复
    pub recoverable: bool,
}

impl ErrorContext {
    /// 创建新的错误上下文
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            recovery_hint: None,
            recoverable: true,
        }
    }

    /// 设置详细信息
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 设置恢复建议
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// 标记为不可恢复
    pub fn not_recoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl AppError {
    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Audio(e) | AppError::Session(SessionError::Audio(e)) => audio_code(e),

            AppError::Network(NetworkError::Timeout(_)) => ErrorCode::NetworkTimeout,
            AppError::Network(NetworkError::ConnectionClosed) => ErrorCode::NetworkClosed,
            AppError::Network(NetworkError::InvalidConfig(_)) => ErrorCode::NetworkInvalidConfig,
            AppError::Network(NetworkError::Codec(e)) | AppError::Codec(e) => codec_code(e),
            AppError::Network(_) => ErrorCode::NetworkConnectionFailed,

            AppError::Config(ConfigError::Json(_)) => ErrorCode::ConfigInvalid,
            AppError::Config(ConfigError::Invalid(_))
            | AppError::Session(SessionError::Config(_)) => ErrorCode::ConfigInvalid,
            AppError::Config(_) => ErrorCode::ConfigLoadFailed,

            AppError::Session(SessionError::CaptureDisabled) => ErrorCode::SessionCaptureDisabled,
            AppError::Session(SessionError::AlreadyRunning) => ErrorCode::SessionAlreadyRunning,
            AppError::Session(SessionError::NotRunning) => ErrorCode::SessionNotRunning,
            AppError::Session(SessionError::Closed) => ErrorCode::SessionClosed,
            AppError::Session(SessionError::Network(_)) => ErrorCode::NetworkConnectionFailed,

            AppError::State(_) | AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// 获取用户友好的错误消息
    ///
    /// 返回适合直接显示在状态栏的文本
    pub fn user_message(&self) -> String {
        match self {
            AppError::Audio(e) | AppError::Session(SessionError::Audio(e)) => {
                audio_message(e).to_string()
            }

            AppError::Network(NetworkError::Timeout(_)) => "Connection timed out".to_string(),
            AppError::Network(NetworkError::ConnectionClosed) => "Disconnected".to_string(),
            AppError::Network(NetworkError::InvalidConfig(_)) => {
                "Invalid server address".to_string()
            }
            AppError::Network(_) => "Connection error".to_string(),
            AppError::Codec(_) => "Connection error".to_string(),

            AppError::Config(ConfigError::Io(_)) | AppError::Config(ConfigError::Path(_)) => {
                "Could not read the configuration file".to_string()
            }
            AppError::Config(_) | AppError::Session(SessionError::Config(_)) => {
                "Invalid configuration".to_string()
            }

            AppError::Session(SessionError::CaptureDisabled) => "Not connected".to_string(),
            AppError::Session(SessionError::AlreadyRunning) => {
                "Microphone already on".to_string()
            }
            AppError::Session(SessionError::NotRunning) => "Microphone already off".to_string(),
            AppError::Session(SessionError::Closed) => "Session ended".to_string(),
            AppError::Session(SessionError::Network(_)) => "Connection error".to_string(),

            AppError::State(_) | AppError::Internal(_) => "Internal error".to_string(),
        }
    }

    /// 映射为状态栏错误
    pub fn status_error(&self) -> StatusError {
        match self {
            AppError::Audio(e) | AppError::Session(SessionError::Audio(e)) => audio_status(e),
            _ => StatusError::Connection,
        }
    }

    /// 获取完整的错误上下文
    pub fn context(&self) -> ErrorContext {
        let mut ctx =
            ErrorContext::new(self.code(), self.user_message()).with_detail(self.to_string());

        ctx.recovery_hint = self.recovery_hint();

        if !self.is_recoverable() {
            ctx = ctx.not_recoverable();
        }

        ctx
    }

    /// 获取恢复建议
    pub fn recovery_hint(&self) -> Option<String> {
        match self.code() {
            ErrorCode::AudioPermissionDenied => {
                Some("Allow microphone access in the system settings".to_string())
            }
            ErrorCode::AudioDeviceNotFound => {
                Some("Connect an audio device or check the configured device name".to_string())
            }
            ErrorCode::NetworkConnectionFailed | ErrorCode::NetworkTimeout => {
                Some("Check that the server is running; reconnecting automatically".to_string())
            }
            ErrorCode::NetworkInvalidConfig => {
                Some("Set server.host to host:port without a scheme".to_string())
            }
            ErrorCode::SessionCaptureDisabled => {
                Some("Wait for the connection to open, then try again".to_string())
            }
            ErrorCode::ConfigInvalid => Some("Fix or delete the configuration file".to_string()),
            _ => None,
        }
    }

    /// 检查错误是否可恢复
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AppError::Config(_)
                | AppError::Internal(_)
                | AppError::Session(SessionError::Closed | SessionError::Config(_))
        )
    }

    /// 检查是否是权限错误
    pub fn is_permission_error(&self) -> bool {
        self.code() == ErrorCode::AudioPermissionDenied
    }
}

fn audio_code(error: &AudioError) -> ErrorCode {
    match error {
        AudioError::DeviceNotFound | AudioError::InvalidDeviceName => {
            ErrorCode::AudioDeviceNotFound
        }
        AudioError::PermissionDenied(_) => ErrorCode::AudioPermissionDenied,
        AudioError::ResampleFailed(_) => ErrorCode::AudioResampleFailed,
        _ => ErrorCode::AudioStreamError,
    }
}

fn audio_message(error: &AudioError) -> &'static str {
    match audio_code(error) {
        ErrorCode::AudioPermissionDenied => "Microphone denied",
        ErrorCode::AudioDeviceNotFound => "No microphone or speaker found",
        ErrorCode::AudioResampleFailed => "Audio processing failed",
        _ => "Audio device error",
    }
}

/// 音频错误对应的状态栏错误
pub fn audio_status(error: &AudioError) -> StatusError {
    match audio_code(error) {
        ErrorCode::AudioPermissionDenied => StatusError::MicrophoneDenied,
        _ => StatusError::Microphone(audio_message(error).to_string()),
    }
}

fn codec_code(error: &CodecError) -> ErrorCode {
    match error {
        CodecError::MalformedFrame => ErrorCode::FrameMalformed,
        CodecError::InvalidPayload { .. } => ErrorCode::FrameInvalidPayload,
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
