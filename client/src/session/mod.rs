//! Wybe 会话模块
//!
//! 把连接管理、采集管线、播放管线和会话状态机组合成一个完整的语音对话客户端
//!
//! # 功能
//!
//! - 自动连接与断线重连
//! - 按帧到达顺序驱动状态机
//! - 麦克风开关（仅在连接打开时允许）
//! - 推送式事件通知展示层
//!
//! # 使用示例
//!
//! ```no_run
//! use wybe_lib::session::ConversationClient;
//! use wybe_lib::state::ClientConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default();
//!     let mut client = ConversationClient::start(&config, |event| println!("{:?}", event))?;
//!
//!     client.toggle_capture().await?;
//!     // ...
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # 工作流程
//!
//! ```text
//! 1. 连接建立
//!    └── Status: Disconnected -> Connecting -> Ready
//!    └── 发送握手帧
//!
//! 2. 用户打开麦克风
//!    └── Event: CaptureChanged { recording: true }
//!    └── 每 200ms 发送一个 AudioIn 帧
//!
//! 3. 服务端帧
//!    └── VadEvent / Status  -> StatusChanged
//!    └── TextAsr / TextLlm  -> TranscriptAppended / TranscriptUpdated
//!    └── AudioOut           -> 播放 + AudioReady
//!
//! 4. 连接断开
//!    └── 停止采集，Status -> Disconnected
//!    └── 等待重连延迟后回到 1
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::audio::{
    AudioCapture, AudioError, CaptureEnded, CapturePipeline, CaptureSource, CpalPlayback,
    PlaybackBackend, PlaybackPipeline,
};
use crate::network::{
    ConnectionConfig, ConnectionEvent, ConnectionHandle, ConnectionManager, NetworkError,
    ServerMessage,
};
use crate::state::{
    ClientConfig, ConfigError, ConversationState, SessionEvent, SessionStatus, StateManager, StatusError,
    TranscriptEntry,
};
use crate::utils::error::audio_status;

/// 连接事件队列容量
const CONNECTION_EVENT_CAPACITY: usize = 256;

/// 命令队列容量
const COMMAND_CAPACITY: usize = 16;

/// 会话错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 连接未打开时不能采集
    #[error("Capture is disabled while the transport is not open")]
    CaptureDisabled,

    /// 采集已在运行
    #[error("Capture is already running")]
    AlreadyRunning,

    /// 采集未运行
    #[error("Capture is not running")]
    NotRunning,

    /// 会话已结束
    #[error("Session has ended")]
    Closed,

    /// 音频错误
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// 网络错误
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// 会话结果类型
pub type SessionResult<T> = Result<T, SessionError>;

/// 会话事件回调
pub type EventObserver = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// 发给会话驱动的命令
enum SessionCommand {
    StartCapture(oneshot::Sender<SessionResult<()>>),
    StopCapture(oneshot::Sender<SessionResult<()>>),
    ToggleCapture(oneshot::Sender<SessionResult<bool>>),
    Shutdown(oneshot::Sender<()>),
}

/// 语音对话客户端
///
/// 所有帧处理与状态变更都在一个驱动任务中按到达顺序执行；
/// 本句柄只发送命令和读取快照
pub struct ConversationClient {
    commands: mpsc::Sender<SessionCommand>,
    state: Arc<StateManager>,
    task: Option<JoinHandle<()>>,
}

impl ConversationClient {
    /// 使用默认音频设备启动会话
    ///
    /// 必须在 Tokio 运行时中调用
    ///
    /// # Errors
    ///
    /// - `SessionError::Config` - 配置未通过校验
    /// - `SessionError::Network` - 服务器地址无效
    pub fn start<F>(config: &ClientConfig, on_event: F) -> SessionResult<Self>
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        Self::with_backends(
            config,
            Box::new(AudioCapture::new(&config.capture)),
            Box::new(CpalPlayback::new()),
            on_event,
        )
    }

    /// 使用指定的采集源和播放后端启动会话
    ///
    /// # Arguments
    ///
    /// * `config` - 客户端配置
    /// * `capture` - 麦克风采集源
    /// * `playback` - 播放后端（首个 AudioOut 帧到达时才打开）
    /// * `on_event` - 会话事件回调，在驱动任务中按顺序调用
    pub fn with_backends<F>(
        config: &ClientConfig,
        capture: Box<dyn CaptureSource>,
        playback: Box<dyn PlaybackBackend>,
        on_event: F,
    ) -> SessionResult<Self>
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        config.validate()?;
        tracing::info!(host = %config.server.host, mode = %config.playback.mode, "Starting conversation session");

        let (events_tx, events_rx) = mpsc::channel(CONNECTION_EVENT_CAPACITY);
        let connection = ConnectionManager::spawn(ConnectionConfig::from(&config.server), events_tx)?;

        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let capture =
            CapturePipeline::new(capture, config.capture.clone()).with_end_notifier(ended_tx);
        let playback = PlaybackPipeline::new(playback, config.playback.clone());

        let state = Arc::new(StateManager::new());
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        let driver = SessionDriver {
            connection,
            capture,
            playback,
            conversation: ConversationState::new(),
            snapshot: Arc::clone(&state),
            observer: Arc::new(on_event),
        };
        let task = tokio::spawn(driver.run(events_rx, commands_rx, ended_rx));

        Ok(Self {
            commands: commands_tx,
            state,
            task: Some(task),
        })
    }

    /// 打开麦克风
    ///
    /// # Errors
    ///
    /// - `SessionError::CaptureDisabled` - 连接未打开
    /// - `SessionError::AlreadyRunning` - 已在采集
    /// - `SessionError::Audio` - 设备错误（包括权限被拒绝）
    pub async fn start_capture(&self) -> SessionResult<()> {
        self.request(SessionCommand::StartCapture).await?
    }

    /// 关闭麦克风
    pub async fn stop_capture(&self) -> SessionResult<()> {
        self.request(SessionCommand::StopCapture).await?
    }

    /// 切换麦克风
    ///
    /// # Returns
    ///
    /// 切换后是否正在采集
    pub async fn toggle_capture(&self) -> SessionResult<bool> {
        self.request(SessionCommand::ToggleCapture).await?
    }

    /// 当前状态
    pub fn status(&self) -> Arc<SessionStatus> {
        self.state.status()
    }

    /// 当前转写快照
    pub fn transcript(&self) -> Arc<Vec<TranscriptEntry>> {
        self.state.transcript()
    }

    /// 是否正在采集
    pub fn is_capturing(&self) -> bool {
        self.state.is_capturing()
    }

    /// 结束会话：停止采集、关闭连接并取消待定的重连
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down conversation session");

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(SessionCommand::Shutdown(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Session task ended abnormally");
            }
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}

/// 会话驱动，独占所有可变状态
struct SessionDriver {
    connection: ConnectionHandle,
    capture: CapturePipeline,
    playback: PlaybackPipeline,
    conversation: ConversationState,
    snapshot: Arc<StateManager>,
    observer: EventObserver,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<ConnectionEvent>,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut ended: mpsc::UnboundedReceiver<CaptureEnded>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_connection_event(event).await,
                    None => break,
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown(reply)) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(notice) = ended.recv() => self.on_capture_ended(notice).await,
            }
        }

        self.teardown().await;
    }

    async fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connecting { attempt } => {
                tracing::debug!(attempt, "Connection attempt");
                let event = self.conversation.on_connecting();
                self.emit_all(event);
            }
            ConnectionEvent::Opened => {
                let event = self.conversation.on_open();
                self.emit_all(event);
            }
            ConnectionEvent::Frame(frame) => match ServerMessage::from_frame(&frame) {
                Ok(Some(ServerMessage::AudioOut(pcm))) => self.play(&pcm),
                Ok(Some(message)) => {
                    let events = self.conversation.apply(&message);
                    self.emit_all(events);
                }
                Ok(None) => {
                    tracing::debug!(kind = frame.kind.name(), "Ignoring frame");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping invalid frame");
                }
            },
            ConnectionEvent::Closed { error } => {
                if let Some(error) = error {
                    tracing::warn!(error = %error, "Transport closed with error");
                }
                self.stop_capture_if_running().await;
                let event = self.conversation.on_closed();
                self.emit_all(event);
            }
            ConnectionEvent::ReconnectScheduled { delay } => {
                tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
            }
        }
    }

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartCapture(reply) => {
                let result = self.start_capture();
                let _ = reply.send(result);
            }
            SessionCommand::StopCapture(reply) => {
                let result = if self.capture.is_running() {
                    self.stop_capture().await;
                    Ok(())
                } else {
                    Err(SessionError::NotRunning)
                };
                let _ = reply.send(result);
            }
            SessionCommand::ToggleCapture(reply) => {
                let result = if self.capture.is_running() {
                    self.stop_capture().await;
                    Ok(false)
                } else {
                    self.start_capture().map(|()| true)
                };
                let _ = reply.send(result);
            }
            SessionCommand::Shutdown(reply) => {
                self.teardown().await;
                let _ = reply.send(());
            }
        }
    }

    async fn on_capture_ended(&mut self, notice: CaptureEnded) {
        if notice.generation != self.capture.generation() {
            tracing::debug!(generation = notice.generation, "Stale capture notice");
            return;
        }

        tracing::warn!("Microphone stream ended");
        self.stop_capture().await;
        let event = self
            .conversation
            .on_local_error(StatusError::Microphone("Microphone disconnected".to_string()));
        self.emit_all(event);
    }

    fn start_capture(&mut self) -> SessionResult<()> {
        if !self.connection.sender().is_open() {
            return Err(SessionError::CaptureDisabled);
        }
        if self.capture.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        match self.capture.start(self.connection.sender()) {
            Ok(()) => {
                self.snapshot.set_capturing(true);
                self.emit(SessionEvent::CaptureChanged { recording: true });
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start capture");
                let event = self.conversation.on_local_error(audio_status(&e));
                self.emit_all(event);
                Err(SessionError::Audio(e))
            }
        }
    }

    async fn stop_capture(&mut self) {
        self.capture.stop().await;
        self.snapshot.set_capturing(false);
        self.emit(SessionEvent::CaptureChanged { recording: false });
    }

    async fn stop_capture_if_running(&mut self) {
        if self.capture.is_running() {
            self.stop_capture().await;
        } else {
            self.capture.stop().await;
        }
    }

    fn play(&mut self, pcm: &[u8]) {
        let (samples, result) = self.playback.play_pcm(pcm);
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to open playback output");
        }
        if !samples.is_empty() {
            self.emit(SessionEvent::AudioReady { samples });
        }
    }

    async fn teardown(&mut self) {
        self.stop_capture_if_running().await;
        self.connection.shutdown().await;
        tracing::info!("Conversation session stopped");
    }

    fn emit_all(&self, events: impl IntoIterator<Item = SessionEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.snapshot.publish(&self.conversation);
        (self.observer)(event);
    }
}
