/// WebSocket connection manager for the conversation channel
///
/// Owns the transport lifecycle: `Idle -> Connecting -> Open -> Closed`,
/// and `Closed -> Connecting` again after the reconnect delay. One manager
/// task runs per client; frames are exchanged through channels.

use crate::network::error::{NetworkError, NetworkResult};
use crate::network::frame::Frame;
use crate::network::tasks::{receiver_task, sender_task, InboundEnd};
use crate::state::config::ServerConfig;
use arc_swap::ArcSwap;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Reconnect delay policy
///
/// The default is a flat delay. A multiplier above 1.0 turns it into
/// exponential backoff capped at `max_delay_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Base delay before a reconnect attempt
    pub delay_ms: u64,

    /// Growth factor per consecutive failed attempt (1.0 = flat)
    pub multiplier: f64,

    /// Upper bound for the grown delay
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    /// Flat delay with no growth
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            multiplier: 1.0,
            max_delay_ms: delay_ms,
        }
    }

    /// Delay to wait after `consecutive_failures` failed connect attempts
    ///
    /// A socket that was open and then closed counts as zero failures.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if self.multiplier <= 1.0 || consecutive_failures == 0 {
            return Duration::from_millis(self.delay_ms);
        }

        let grown = self.delay_ms as f64 * self.multiplier.powi(consecutive_failures as i32);
        let capped = grown.min(self.max_delay_ms.max(self.delay_ms) as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(3000)
    }
}

/// Configuration for the conversation connection
///
/// # Example
/// ```
/// use wybe_lib::network::ConnectionConfig;
///
/// let config = ConnectionConfig::new("voice.example.com")
///     .with_secure(true)
///     .with_reconnect_delay(1000);
///
/// assert_eq!(
///     config.build_url().unwrap(),
///     "wss://voice.example.com/ws/conversation"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host and optional port of the serving host
    pub host: String,

    /// Use `wss://` instead of `ws://`
    pub secure: bool,

    /// Well-known endpoint path
    pub path: String,

    /// Protocol version declared in the handshake
    pub protocol_version: u32,

    /// Connection timeout in milliseconds
    pub timeout_ms: u64,

    /// Delay policy between reconnect attempts
    pub reconnect: ReconnectPolicy,

    /// Capacity of the outbound frame queue
    pub outbound_capacity: usize,
}

impl ConnectionConfig {
    /// Create a new configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            secure: false,
            path: "/ws/conversation".to_string(),
            protocol_version: 1,
            timeout_ms: 10000,
            reconnect: ReconnectPolicy::default(),
            outbound_capacity: 64,
        }
    }

    /// Use the secure scheme
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the endpoint path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set connection timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set a flat reconnect delay in milliseconds
    pub fn with_reconnect_delay(mut self, delay_ms: u64) -> Self {
        self.reconnect = ReconnectPolicy::fixed(delay_ms);
        self
    }

    /// Set the full reconnect policy
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Build the WebSocket URL
    pub fn build_url(&self) -> NetworkResult<String> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(NetworkError::InvalidConfig("host is empty".to_string()));
        }
        if host.contains("://") {
            return Err(NetworkError::InvalidConfig(format!(
                "host must not include a scheme: {}",
                host
            )));
        }
        if !self.path.starts_with('/') {
            return Err(NetworkError::InvalidConfig(format!(
                "path must start with '/': {}",
                self.path
            )));
        }

        let scheme = if self.secure { "wss" } else { "ws" };
        Ok(format!("{}://{}{}", scheme, host, self.path))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("localhost:8080")
    }
}

impl From<&ServerConfig> for ConnectionConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            secure: server.secure,
            path: server.path.clone(),
            protocol_version: server.protocol_version,
            timeout_ms: server.connect_timeout_ms,
            reconnect: ReconnectPolicy {
                delay_ms: server.reconnect_delay_ms,
                multiplier: server.reconnect_backoff,
                max_delay_ms: server.max_reconnect_delay_ms,
            },
            outbound_capacity: 64,
        }
    }
}

/// Transport lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Manager created, no attempt made yet
    Idle,
    /// Connect attempt in progress
    Connecting,
    /// Socket open, frames flow both ways
    Open,
    /// Socket closed, reconnect pending
    Closed,
}

/// Events reported by the connection manager, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connect attempt started
    Connecting {
        /// Attempt number since the last open socket (1-based)
        attempt: u32,
    },

    /// Socket opened and handshake sent
    Opened,

    /// A decoded inbound frame of a known kind
    Frame(Frame),

    /// Socket closed or connect attempt failed
    Closed {
        /// Error description, `None` for a normal close
        error: Option<String>,
    },

    /// Exactly one of these follows every `Closed`
    ReconnectScheduled {
        /// Delay before the next attempt
        delay: Duration,
    },
}

/// Cloneable handle for sending frames
///
/// `send` never blocks or queues on a closed transport: the frame is
/// dropped unless the connection is `Open`.
#[derive(Clone)]
pub struct FrameSender {
    state: Arc<ArcSwap<ConnectionState>>,
    tx: mpsc::Sender<Frame>,
}

impl FrameSender {
    /// Create a sender over a shared state cell and an outbound queue
    pub fn new(state: Arc<ArcSwap<ConnectionState>>, tx: mpsc::Sender<Frame>) -> Self {
        Self { state, tx }
    }

    /// Queue a frame for transmission
    ///
    /// # Returns
    /// `true` if the frame was queued, `false` if it was dropped
    pub fn send(&self, frame: Frame) -> bool {
        if !self.is_open() {
            debug!(kind = frame.kind.name(), "Transport not open, dropping frame");
            return false;
        }

        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(kind = frame.kind.name(), "Outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Check if the transport is open
    pub fn is_open(&self) -> bool {
        **self.state.load() == ConnectionState::Open
    }

    /// Current transport state
    pub fn state(&self) -> ConnectionState {
        **self.state.load()
    }
}

/// Spawns and owns the connection task
pub struct ConnectionManager;

impl ConnectionManager {
    /// Start the connection loop
    ///
    /// The loop connects, sends the handshake, pumps frames until the socket
    /// closes, then waits the reconnect delay and starts over. It runs until
    /// the returned handle is shut down or dropped.
    ///
    /// # Errors
    /// Returns `NetworkError::InvalidConfig` if the URL cannot be built.
    pub fn spawn(
        config: ConnectionConfig,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> NetworkResult<ConnectionHandle> {
        let url = config.build_url()?;
        info!(url = %url, "Starting connection manager");

        let state = Arc::new(ArcSwap::from_pointee(ConnectionState::Idle));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let link = Link {
            state: Arc::clone(&state),
            events,
        };
        let task = tokio::spawn(run_loop(config, url, link, outbound_rx, shutdown_rx));

        Ok(ConnectionHandle {
            sender: FrameSender::new(state, outbound_tx),
            shutdown_tx,
            task: Some(task),
        })
    }
}

/// Handle to a running connection manager
pub struct ConnectionHandle {
    sender: FrameSender,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Get a sender for outbound frames
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Current transport state
    pub fn state(&self) -> ConnectionState {
        self.sender.state()
    }

    /// Stop the manager: closes the socket and cancels any pending reconnect
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Connection task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// State cell and event channel shared by the loop
struct Link {
    state: Arc<ArcSwap<ConnectionState>>,
    events: mpsc::Sender<ConnectionEvent>,
}

impl Link {
    fn set_state(&self, state: ConnectionState) {
        debug!(?state, "Connection state");
        self.state.store(Arc::new(state));
    }

    /// Returns false once the observer is gone or shutdown was requested
    ///
    /// A full event queue never holds up shutdown.
    async fn emit(&self, event: ConnectionEvent, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;

            _ = wait_for_shutdown(shutdown_rx) => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }
}

/// How one open socket ended
enum ServeOutcome {
    Closed(Option<String>),
    Shutdown,
    ObserverGone,
}

async fn run_loop(
    config: ConnectionConfig,
    url: String,
    link: Link,
    mut outbound_rx: mpsc::Receiver<Frame>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        link.set_state(ConnectionState::Connecting);
        let connecting = ConnectionEvent::Connecting { attempt: failures + 1 };
        if !link.emit(connecting, &mut shutdown_rx).await {
            break;
        }

        let attempt = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown_rx) => break,
            result = connect(&url, config.timeout_ms) => result,
        };

        let close_error = match attempt {
            Ok(ws_stream) => {
                failures = 0;

                // Frames queued against the previous socket are stale.
                let mut stale = 0usize;
                while outbound_rx.try_recv().is_ok() {
                    stale += 1;
                }
                if stale > 0 {
                    debug!("Discarded {} stale outbound frames", stale);
                }

                link.set_state(ConnectionState::Open);
                match serve(ws_stream, &config, &link, &mut outbound_rx, &mut shutdown_rx).await {
                    ServeOutcome::Closed(error) => error,
                    ServeOutcome::Shutdown | ServeOutcome::ObserverGone => break,
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!("Connect attempt failed: {}", e);
                Some(e.to_string())
            }
        };

        link.set_state(ConnectionState::Closed);
        info!(error = ?close_error, "Connection closed");
        if !link.emit(ConnectionEvent::Closed { error: close_error }, &mut shutdown_rx).await {
            return;
        }

        let delay = config.reconnect.delay_for(failures);
        info!("Reconnecting in {}ms", delay.as_millis());
        if !link.emit(ConnectionEvent::ReconnectScheduled { delay }, &mut shutdown_rx).await {
            return;
        }

        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown_rx) => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    link.set_state(ConnectionState::Closed);
    info!("Connection manager stopped");
}

async fn connect(url: &str, timeout_ms: u64) -> NetworkResult<WsStream> {
    info!(url = %url, "Connecting to conversation endpoint");

    let timeout = Duration::from_millis(timeout_ms);
    let (ws_stream, response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| NetworkError::Timeout(timeout_ms))?
        .map_err(|e| match e {
            tungstenite::Error::Io(io) => NetworkError::ConnectionFailed(io.to_string()),
            other => NetworkError::ConnectionFailed(other.to_string()),
        })?;

    info!("Connected (status: {})", response.status());
    Ok(ws_stream)
}

async fn serve(
    ws_stream: WsStream,
    config: &ConnectionConfig,
    link: &Link,
    outbound_rx: &mut mpsc::Receiver<Frame>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ServeOutcome {
    let (mut writer, reader) = ws_stream.split();

    // Fire-and-forget: no acknowledgement is awaited.
    let handshake = Frame::handshake(config.protocol_version);
    if let Err(e) = writer.send(Message::Binary(handshake.encode().into())).await {
        return ServeOutcome::Closed(Some(NetworkError::from(e).to_string()));
    }
    debug!(version = config.protocol_version, "Handshake sent");

    if !link.emit(ConnectionEvent::Opened, shutdown_rx).await {
        if let Err(e) = writer.close().await {
            debug!("Failed to close WebSocket writer: {}", e);
        }
        return ServeOutcome::ObserverGone;
    }

    let outcome = tokio::select! {
        _ = wait_for_shutdown(shutdown_rx) => ServeOutcome::Shutdown,
        inbound = receiver_task(reader, &link.events) => match inbound {
            Ok(InboundEnd::Closed) => ServeOutcome::Closed(None),
            Ok(InboundEnd::ObserverGone) => ServeOutcome::ObserverGone,
            Err(e) => ServeOutcome::Closed(Some(e.to_string())),
        },
        outbound = sender_task(&mut writer, outbound_rx) => match outbound {
            Ok(()) => ServeOutcome::Shutdown,
            Err(e) => ServeOutcome::Closed(Some(e.to_string())),
        },
    };

    if matches!(outcome, ServeOutcome::Shutdown | ServeOutcome::ObserverGone) {
        if let Err(e) = writer.close().await {
            debug!("Failed to close WebSocket writer: {}", e);
        }
    }

    outcome
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
