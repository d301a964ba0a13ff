use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use super::error::{StateError, StateResult};

/// 错误状态的具体原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum StatusError {
    /// 服务端通过 Error 帧报告的错误（原文显示）
    Server(String),
    /// 传输层错误
    Connection,
    /// 麦克风访问被拒绝
    MicrophoneDenied,
    /// 其他麦克风错误
    Microphone(String),
}

impl StatusError {
    /// 面向用户的描述
    pub fn label(&self) -> String {
        match self {
            Self::Server(message) => format!("Error: {}", message),
            Self::Connection => "Connection error".to_string(),
            Self::MicrophoneDenied => "Microphone denied".to_string(),
            Self::Microphone(message) => format!("Microphone error: {}", message),
        }
    }
}

/// 会话状态
///
/// 除 `Disconnected` / `Connecting` 由连接层驱动外，其余状态只由服务端帧驱动
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SessionStatus {
    /// 未连接（初始状态，或连接关闭后等待重连）
    #[default]
    Disconnected,
    /// 正在建立连接
    Connecting,
    /// 已连接，空闲
    Ready,
    /// 正在听用户说话
    Listening,
    /// 服务端正在生成回复
    Thinking,
    /// 正在播放回复语音
    Speaking,
    /// 错误状态
    Error(StatusError),
    /// 未知的服务端状态标记，原样保留
    Other(String),
}

impl SessionStatus {
    /// 从服务端状态标记解析
    ///
    /// 未知标记不会失败，而是保存为 `Other`
    ///
    /// # Examples
    ///
    /// ```
    /// use wybe_lib::state::SessionStatus;
    ///
    /// assert_eq!(SessionStatus::from_token("thinking"), SessionStatus::Thinking);
    /// assert_eq!(
    ///     SessionStatus::from_token("warming_up"),
    ///     SessionStatus::Other("warming_up".to_string())
    /// );
    /// ```
    pub fn from_token(token: &str) -> Self {
        match token {
            "ready" => Self::Ready,
            "listening" => Self::Listening,
            "thinking" => Self::Thinking,
            "speaking" => Self::Speaking,
            other => Self::Other(other.to_string()),
        }
    }

    /// 状态栏文本
    pub fn label(&self) -> String {
        match self {
            Self::Disconnected => "Disconnected".to_string(),
            Self::Connecting => "Connecting...".to_string(),
            Self::Ready => "Ready".to_string(),
            Self::Listening => "Listening...".to_string(),
            Self::Thinking => "Thinking...".to_string(),
            Self::Speaking => "Speaking...".to_string(),
            Self::Error(error) => error.label(),
            Self::Other(token) => token.clone(),
        }
    }

    /// 机器可读的状态标记（用于样式类名）
    pub fn token(&self) -> &str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Error(_) => "error",
            Self::Other(token) => token,
        }
    }

    /// 检查是否为错误类显示（错误或断开）
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Disconnected)
    }

    /// 检查传输层是否处于连接状态
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::Connecting)
    }
}

/// 转写条目角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// 用户（ASR 结果）
    User,
    /// 助手（LLM 输出）
    Assistant,
}

impl TranscriptRole {
    /// 显示名称
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Wybe",
        }
    }
}

/// 转写条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    /// 角色
    pub role: TranscriptRole,
    /// 文本
    pub text: String,
}

impl TranscriptEntry {
    /// 创建用户条目
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::User,
            text: text.into(),
        }
    }

    /// 创建助手条目
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Assistant,
            text: text.into(),
        }
    }
}

/// 正在累积的助手条目在转写中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenEntry(usize);

impl OpenEntry {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// 条目下标
    pub fn index(&self) -> usize {
        self.0
    }
}

/// 会话状态
///
/// 由会话驱动独占；转写只追加，已有条目只有当前打开的助手条目会增长
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub(crate) status: SessionStatus,
    pub(crate) transcript: Vec<TranscriptEntry>,
    pub(crate) open_entry: Option<OpenEntry>,
}

impl ConversationState {
    /// 创建初始状态（未连接，空转写）
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// 完整转写
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// 当前打开的助手条目
    pub fn open_entry(&self) -> Option<OpenEntry> {
        self.open_entry
    }

    /// 按下标获取条目
    pub fn entry(&self, index: usize) -> StateResult<&TranscriptEntry> {
        self.transcript
            .get(index)
            .ok_or(StateError::EntryNotFound(index))
    }
}

/// 状态快照发布器
///
/// 会话驱动在每次变更后发布快照，其他线程无锁读取
pub struct StateManager {
    status: ArcSwap<SessionStatus>,
    transcript: ArcSwap<Vec<TranscriptEntry>>,
    capturing: AtomicBool,
}

impl StateManager {
    /// 创建新的状态管理器
    ///
    /// # Examples
    ///
    /// ```
    /// use wybe_lib::state::{SessionStatus, StateManager};
    ///
    /// let manager = StateManager::new();
    /// assert_eq!(*manager.status(), SessionStatus::Disconnected);
    /// assert!(manager.transcript().is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            status: ArcSwap::from_pointee(SessionStatus::Disconnected),
            transcript: ArcSwap::from_pointee(Vec::new()),
            capturing: AtomicBool::new(false),
        }
    }

    /// 当前状态
    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.load_full()
    }

    /// 当前转写快照
    pub fn transcript(&self) -> Arc<Vec<TranscriptEntry>> {
        self.transcript.load_full()
    }

    /// 是否正在采集麦克风
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// 发布会话状态快照
    pub fn publish(&self, state: &ConversationState) {
        if **self.status.load() != state.status {
            self.status.store(Arc::new(state.status.clone()));
        }
        if self.transcript.load().as_slice() != state.transcript.as_slice() {
            self.transcript.store(Arc::new(state.transcript.clone()));
        }
    }

    /// 发布采集状态
    pub fn set_capturing(&self, capturing: bool) {
        self.capturing.store(capturing, Ordering::Release);
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tokens() {
        assert_eq!(SessionStatus::from_token("ready"), SessionStatus::Ready);
        assert_eq!(SessionStatus::from_token("listening"), SessionStatus::Listening);
        assert_eq!(SessionStatus::from_token("thinking"), SessionStatus::Thinking);
        assert_eq!(SessionStatus::from_token("speaking"), SessionStatus::Speaking);
        assert_eq!(
            SessionStatus::from_token("Ready"),
            SessionStatus::Other("Ready".to_string())
        );
    }

    #[test]
    fn test_unknown_status_displayed_verbatim() {
        let status = SessionStatus::from_token("warming_up");
        assert_eq!(status.label(), "warming_up");
        assert_eq!(status.token(), "warming_up");
        assert!(!status.is_error());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::Ready.label(), "Ready");
        assert_eq!(SessionStatus::Listening.label(), "Listening...");
        assert_eq!(
            SessionStatus::Error(StatusError::Server("Audio decode error".to_string())).label(),
            "Error: Audio decode error"
        );
        assert_eq!(
            SessionStatus::Error(StatusError::MicrophoneDenied).label(),
            "Microphone denied"
        );
        assert!(SessionStatus::Disconnected.is_error());
        assert!(!SessionStatus::Disconnected.is_connected());
        assert!(SessionStatus::Thinking.is_connected());
    }

    #[test]
    fn test_initial_state() {
        let state = ConversationState::new();
        assert_eq!(*state.status(), SessionStatus::Disconnected);
        assert!(state.transcript().is_empty());
        assert!(state.open_entry().is_none());
        assert_eq!(state.entry(0), Err(StateError::EntryNotFound(0)));
    }

    #[test]
    fn test_state_manager_publish() {
        let manager = StateManager::new();
        let mut state = ConversationState::new();
        state.status = SessionStatus::Ready;
        state.transcript.push(TranscriptEntry::user("hello"));

        manager.publish(&state);

        assert_eq!(*manager.status(), SessionStatus::Ready);
        assert_eq!(manager.transcript().as_slice(), &[TranscriptEntry::user("hello")]);

        manager.set_capturing(true);
        assert!(manager.is_capturing());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SessionStatus::Thinking).unwrap();
        assert_eq!(json, r#"{"status":"thinking"}"#);

        let json = serde_json::to_string(&TranscriptEntry::assistant("Hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","text":"Hi"}"#);
    }
}
