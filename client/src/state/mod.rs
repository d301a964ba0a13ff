//! 状态管理模块
//!
//! 提供会话状态机、配置和状态快照
//!
//! # 模块结构
//!
//! - `app_state` - 会话状态、转写和状态快照发布器
//! - `config` - 客户端配置
//! - `error` - 状态相关错误类型
//! - `transitions` - 帧驱动的状态转换和会话事件

mod app_state;
pub mod config;
mod error;
mod transitions;

pub use app_state::{
    ConversationState, OpenEntry, SessionStatus, StateManager, StatusError, TranscriptEntry,
    TranscriptRole,
};
pub use config::{
    CaptureConfig, ClientConfig, ConfigError, ConfigManager, ConfigResult, PlaybackConfig,
    ServerConfig,
};
pub use error::{StateError, StateResult};
pub use transitions::SessionEvent;
