//! 状态转换模块
//!
//! 将服务端帧与连接层事件映射为状态变更，并产出推送给展示层的事件：
//! - `StatusChanged` 状态变化（相同状态不重复发出）
//! - `TranscriptAppended` / `TranscriptUpdated` 转写追加与增长
//! - `AudioReady` 可播放的音频
//! - `CaptureChanged` 麦克风开关

use serde::Serialize;

use super::app_state::{
    ConversationState, OpenEntry, SessionStatus, StatusError, TranscriptEntry, TranscriptRole,
};
use super::error::{StateError, StateResult};
use crate::network::{ServerMessage, VadEvent};

/// 推送给展示层的会话事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 状态变化
    StatusChanged { status: SessionStatus },
    /// 新增转写条目
    TranscriptAppended { index: usize, entry: TranscriptEntry },
    /// 打开的助手条目增长
    TranscriptUpdated { index: usize, entry: TranscriptEntry },
    /// 一段解码后的语音已交给播放
    AudioReady { samples: Vec<f32> },
    /// 麦克风采集开关变化
    CaptureChanged { recording: bool },
}

impl ConversationState {
    /// 应用一条服务端消息
    ///
    /// `AudioOut` 不改变状态，由会话驱动交给播放管线
    ///
    /// # Examples
    ///
    /// ```
    /// use wybe_lib::network::ServerMessage;
    /// use wybe_lib::state::{ConversationState, SessionStatus};
    ///
    /// let mut state = ConversationState::new();
    /// state.apply(&ServerMessage::Status { status: "thinking".to_string() });
    /// assert_eq!(*state.status(), SessionStatus::Thinking);
    /// ```
    pub fn apply(&mut self, message: &ServerMessage) -> Vec<SessionEvent> {
        match message {
            ServerMessage::Vad(VadEvent::SpeechStart) => {
                self.set_status(SessionStatus::Listening).into_iter().collect()
            }
            ServerMessage::Vad(event) => {
                tracing::debug!(?event, "Ignoring VAD event");
                Vec::new()
            }
            ServerMessage::Status { status } => self
                .set_status(SessionStatus::from_token(status))
                .into_iter()
                .collect(),
            ServerMessage::Asr { text } => vec![self.append_user(text)],
            ServerMessage::Llm { text, done } => self.apply_llm(text, *done),
            ServerMessage::Error { message } => {
                tracing::warn!(error = %message, "Server reported error");
                self.set_status(SessionStatus::Error(StatusError::Server(message.clone())))
                    .into_iter()
                    .collect()
            }
            ServerMessage::AudioOut(_) => Vec::new(),
        }
    }

    /// 连接层开始建立连接
    pub fn on_connecting(&mut self) -> Option<SessionEvent> {
        self.set_status(SessionStatus::Connecting)
    }

    /// 连接已打开
    pub fn on_open(&mut self) -> Option<SessionEvent> {
        self.set_status(SessionStatus::Ready)
    }

    /// 连接已关闭
    ///
    /// 打开的助手条目保持原样关闭
    pub fn on_closed(&mut self) -> Option<SessionEvent> {
        self.open_entry = None;
        self.set_status(SessionStatus::Disconnected)
    }

    /// 本地产生的错误（麦克风、传输层），不影响连接
    pub fn on_local_error(&mut self, error: StatusError) -> Option<SessionEvent> {
        self.set_status(SessionStatus::Error(error))
    }

    fn set_status(&mut self, status: SessionStatus) -> Option<SessionEvent> {
        if self.status == status {
            return None;
        }

        tracing::info!(from = %self.status.token(), to = %status.token(), "Status changed");
        self.status = status.clone();
        Some(SessionEvent::StatusChanged { status })
    }

    /// 新的用户发言总是关闭上一轮助手回复
    fn append_user(&mut self, text: &str) -> SessionEvent {
        if let Some(open) = self.open_entry.take() {
            tracing::debug!(index = open.index(), "Closing assistant entry on new user turn");
        }

        let entry = TranscriptEntry::user(text);
        self.transcript.push(entry.clone());
        SessionEvent::TranscriptAppended {
            index: self.transcript.len() - 1,
            entry,
        }
    }

    fn apply_llm(&mut self, text: &str, done: bool) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if !text.is_empty() {
            match self.extend_open_entry(text) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {
                    let entry = TranscriptEntry::assistant(text);
                    self.transcript.push(entry.clone());
                    let index = self.transcript.len() - 1;
                    self.open_entry = Some(OpenEntry::new(index));
                    events.push(SessionEvent::TranscriptAppended { index, entry });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping stale assistant entry");
                    self.open_entry = None;
                    events.extend(self.apply_llm(text, false));
                }
            }
        }

        if done {
            self.open_entry = None;
        }

        events
    }

    /// 追加到打开的助手条目；没有打开的条目时返回 `Ok(None)`
    fn extend_open_entry(&mut self, text: &str) -> StateResult<Option<SessionEvent>> {
        let Some(open) = self.open_entry else {
            return Ok(None);
        };

        let index = open.index();
        let entry = self
            .transcript
            .get_mut(index)
            .ok_or(StateError::EntryNotFound(index))?;
        if entry.role != TranscriptRole::Assistant {
            return Err(StateError::NotAssistantEntry(index));
        }

        entry.text.push_str(text);
        Ok(Some(SessionEvent::TranscriptUpdated {
            index,
            entry: entry.clone(),
        }))
    }
}
