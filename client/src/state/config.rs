//! 客户端配置模块
//!
//! 提供客户端配置的加载、保存、环境变量覆盖和校验
//!
//! # 配置存储位置
//!
//! - Windows: `%APPDATA%/wybe/config.json`
//! - macOS: `~/Library/Application Support/wybe/config.json`
//! - Linux: `~/.config/wybe/config.json`
//!
//! # 使用示例
//!
//! ```no_run
//! use wybe_lib::state::config::{ClientConfig, ConfigManager};
//!
//! let mut config = ConfigManager::load_or_default(None).unwrap();
//! config.server.host = "voice.example.com".to_string();
//! config.server.secure = true;
//!
//! ConfigManager::save(&ConfigManager::default_path().unwrap(), &config).unwrap();
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::scheduler::PlaybackMode;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 路径错误
    #[error("Path error: {0}")]
    Path(String),

    /// 配置值无效
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 配置结果类型
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 客户端配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 服务端连接配置
    pub server: ServerConfig,
    /// 麦克风采集配置
    pub capture: CaptureConfig,
    /// 语音播放配置
    pub playback: PlaybackConfig,
}

/// 服务端连接配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 主机名和端口
    pub host: String,
    /// 是否使用 `wss://`
    pub secure: bool,
    /// 会话端点路径
    pub path: String,
    /// 握手中声明的协议版本
    pub protocol_version: u32,
    /// 连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 重连延迟（毫秒）
    pub reconnect_delay_ms: u64,
    /// 重连延迟增长倍数（1.0 表示固定延迟）
    pub reconnect_backoff: f64,
    /// 重连延迟上限（毫秒）
    pub max_reconnect_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost:8080".to_string(),
            secure: false,
            path: "/ws/conversation".to_string(),
            protocol_version: 1,
            connect_timeout_ms: 10000,
            reconnect_delay_ms: 3000,
            reconnect_backoff: 1.0,
            max_reconnect_delay_ms: 30000,
        }
    }
}

/// 麦克风采集配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 输入设备名称（None 表示默认设备）
    pub input_device: Option<String>,
    /// 发送给服务端的采样率
    pub sample_rate: u32,
    /// 分块间隔（毫秒）
    pub chunk_ms: u32,
    /// 请求回声消除
    pub echo_cancellation: bool,
    /// 请求噪声抑制
    pub noise_suppression: bool,
    /// 设备回调到处理任务之间的通道容量
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            sample_rate: 16000,
            chunk_ms: 200,
            echo_cancellation: true,
            noise_suppression: true,
            channel_capacity: 64,
        }
    }
}

impl CaptureConfig {
    /// 每个分块的采样数
    pub fn chunk_samples(&self) -> usize {
        (self.sample_rate as u64 * self.chunk_ms as u64 / 1000) as usize
    }
}

/// 语音播放配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 输出设备名称（None 表示默认设备）
    pub output_device: Option<String>,
    /// 服务端音频采样率
    pub sample_rate: u32,
    /// 缓冲区调度模式
    pub mode: PlaybackMode,
    /// 待播放缓冲区队列容量
    pub queue_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            sample_rate: 24000,
            mode: PlaybackMode::Overlap,
            queue_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// 校验配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host is empty".to_string()));
        }
        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.path must start with '/': {}",
                self.server.path
            )));
        }
        if self.capture.sample_rate == 0 || self.playback.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample rate must be positive".to_string()));
        }
        if self.capture.chunk_samples() == 0 {
            return Err(ConfigError::Invalid("capture.chunk_ms is too small".to_string()));
        }
        if self.server.reconnect_backoff < 1.0 {
            return Err(ConfigError::Invalid(
                "server.reconnect_backoff must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// 应用 `WYBE_*` 环境变量覆盖
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// 使用给定的查找函数应用覆盖
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WYBE_HOST") {
            self.server.host = host;
        }

        if let Some(secure) = lookup("WYBE_SECURE") {
            self.server.secure = match secure.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ConfigError::Invalid(format!("WYBE_SECURE: {}", other)));
                }
            };
        }

        if let Some(mode) = lookup("WYBE_PLAYBACK_MODE") {
            self.playback.mode = mode
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("WYBE_PLAYBACK_MODE: {}", mode)))?;
        }

        if let Some(delay) = lookup("WYBE_RECONNECT_DELAY_MS") {
            self.server.reconnect_delay_ms = delay
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("WYBE_RECONNECT_DELAY_MS: {}", delay)))?;
        }

        Ok(())
    }
}

/// 配置管理器
///
/// 提供配置文件的读写
pub struct ConfigManager;

impl ConfigManager {
    /// 默认配置文件路径
    pub fn default_path() -> ConfigResult<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Path("no config directory on this platform".to_string()))?;
        Ok(dir.join("wybe").join("config.json"))
    }

    /// 加载配置
    ///
    /// 文件不存在时返回默认配置
    pub fn load(path: &Path) -> ConfigResult<ClientConfig> {
        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ClientConfig = serde_json::from_str(&content)?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!("Config file not found, using defaults");
            Ok(ClientConfig::default())
        }
    }

    /// 从指定路径或默认路径加载配置
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<ClientConfig> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load(&Self::default_path()?),
        }
    }

    /// 保存配置
    pub fn save(path: &Path, config: &ClientConfig) -> ConfigResult<()> {
        tracing::debug!(path = %path.display(), "Saving config");

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }
}
