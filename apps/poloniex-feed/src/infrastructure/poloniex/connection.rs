//! Feed Connection Manager
//!
//! Owns the single multiplexed WebSocket to the push API.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Closing ──► Disconnected
//!                      ▲              │
//!                      └── failure ───┘
//! ```
//!
//! Every installed socket gets a new generation number. The read loop, the
//! keepalive task and command writers all act on a generation they observed
//! earlier, and [`ConnectionManager::mark_dead`] only takes effect when that
//! generation is still current. A stale failure report therefore cannot tear
//! down a socket that was redialled in the meantime.
//!
//! Dials are serialized: concurrent callers of
//! [`ConnectionManager::ensure_connected`] share one bounded retry sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatState, KeepaliveTarget};
use super::messages::CommandMessage;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{Command, CommandSink, FrameHandler};
use crate::error::ConnectionError;
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// =============================================================================
// Configuration
// =============================================================================

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Feed endpoint.
    pub url: String,
    /// Timeout for one dial.
    pub connect_timeout: Duration,
    /// Longest silence tolerated on a live socket.
    pub read_timeout: Duration,
    /// Timeout for the liveness probe and the close handshake.
    pub probe_timeout: Duration,
    /// Dial retry policy.
    pub reconnect: ReconnectConfig,
    /// Keepalive timing.
    pub heartbeat: HeartbeatConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "wss://api2.poloniex.com".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Build from connection settings.
    #[must_use]
    pub fn from_settings(settings: &crate::infrastructure::config::ConnectionSettings) -> Self {
        Self {
            url: settings.url.clone(),
            connect_timeout: settings.connect_timeout,
            read_timeout: settings.read_timeout,
            probe_timeout: settings.probe_timeout,
            reconnect: ReconnectConfig::from_connection_settings(settings),
            heartbeat: HeartbeatConfig::from_connection_settings(settings),
        }
    }
}

// =============================================================================
// State
// =============================================================================

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Dial in progress or pending after a failure.
    Connecting,
    /// Socket installed and live.
    Connected,
    /// Explicit shutdown in progress.
    Closing,
}

impl ConnectionState {
    /// Gauge value.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Closing => 3,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }
}

/// Snapshot of connection counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Current state.
    pub state: ConnectionState,
    /// Current generation.
    pub generation: u64,
    /// Text frames received across all sockets.
    pub frames_received: u64,
    /// Successful dials after the first.
    pub reconnects: u64,
    /// Failed dial attempts.
    pub dial_failures: u64,
    /// Most recent connection error.
    pub last_error: Option<String>,
}

struct Writer {
    generation: u64,
    sink: WsSink,
}

enum ReadOutcome {
    Cancelled,
    Replaced,
    Failed(String),
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Owner of the feed socket.
pub struct ConnectionManager {
    config: ConnectionConfig,
    generation: AtomicU64,
    live: AtomicBool,
    state: RwLock<ConnectionState>,
    writer: AsyncMutex<Option<Writer>>,
    reader: Mutex<Option<(u64, WsSource)>>,
    dial_lock: AsyncMutex<()>,
    dead: Notify,
    generation_tx: watch::Sender<u64>,
    heartbeat: HeartbeatState,
    cancel: CancellationToken,
    frames_received: AtomicU64,
    reconnects: AtomicU64,
    dial_failures: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.config.url)
            .field("generation", &self.generation())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager. Nothing is dialled until first use.
    #[must_use]
    pub fn new(config: ConnectionConfig, cancel: CancellationToken) -> Self {
        let (generation_tx, _) = watch::channel(0);
        Self {
            config,
            generation: AtomicU64::new(0),
            live: AtomicBool::new(false),
            state: RwLock::new(ConnectionState::Disconnected),
            writer: AsyncMutex::new(None),
            reader: Mutex::new(None),
            dial_lock: AsyncMutex::new(()),
            dead: Notify::new(),
            generation_tx,
            heartbeat: HeartbeatState::new(),
            cancel,
            frames_received: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            dial_failures: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current generation; zero before the first dial.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether the current socket is believed live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Watch generation changes.
    #[must_use]
    pub fn subscribe_generation(&self) -> watch::Receiver<u64> {
        self.generation_tx.subscribe()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            state: self.state(),
            generation: self.generation(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        // After close only the terminal Disconnected may be entered.
        if self.is_closed() && state != ConnectionState::Disconnected {
            return;
        }
        *self.state.write() = state;
        metrics::set_connection_state(state.code());
    }

    fn record_error(&self, error: &str) {
        *self.last_error.write() = Some(error.to_string());
    }

    // -------------------------------------------------------------------------
    // EnsureConnected
    // -------------------------------------------------------------------------

    /// Return the live generation, dialling first if needed.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Closed`] after `close`, or
    /// [`ConnectionError::DialExhausted`] when every allowed dial failed.
    pub async fn ensure_connected(&self) -> Result<u64, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        if self.is_live() && self.probe().await {
            return Ok(self.generation());
        }

        let _dial = self.dial_lock.lock().await;
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        // Another caller may have dialled while we waited.
        if self.is_live() {
            return Ok(self.generation());
        }
        self.dial().await
    }

    /// Non-blocking liveness probe.
    ///
    /// A writer that is busy counts as live. Otherwise a ping is written
    /// within the probe timeout.
    async fn probe(&self) -> bool {
        let generation = self.generation();
        if self.heartbeat.is_overdue(self.config.heartbeat.pong_timeout) {
            self.mark_dead(generation, "keepalive overdue");
            return false;
        }

        let Ok(mut writer) = self.writer.try_lock() else {
            return true;
        };
        let Some(socket) = writer.as_mut().filter(|w| w.generation == generation) else {
            return false;
        };

        let ping = socket.sink.send(Message::Ping(Vec::new().into()));
        match tokio::time::timeout(self.config.probe_timeout, ping).await {
            Ok(Ok(())) => {
                self.heartbeat.mark_ping_sent();
                true
            }
            Ok(Err(e)) => {
                drop(writer);
                self.mark_dead(generation, &format!("probe failed: {e}"));
                false
            }
            Err(_) => {
                drop(writer);
                self.mark_dead(generation, "probe timed out");
                false
            }
        }
    }

    async fn dial(&self) -> Result<u64, ConnectionError> {
        self.set_state(ConnectionState::Connecting);
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            let attempt = policy.attempt_count() + 1;
            tracing::info!(url = %self.config.url, attempt, "Dialing feed");

            let connect = tokio::time::timeout(
                self.config.connect_timeout,
                tokio_tungstenite::connect_async(self.config.url.as_str()),
            );
            let result = tokio::select! {
                () = self.cancel.cancelled() => return Err(ConnectionError::Closed),
                result = connect => result,
            };

            let error = match result {
                Ok(Ok((stream, _response))) => return self.install(stream).await,
                Ok(Err(e)) => ConnectionError::from(e),
                Err(_) => ConnectionError::ConnectTimeout(self.config.connect_timeout),
            };

            self.dial_failures.fetch_add(1, Ordering::Relaxed);
            self.record_error(&error.to_string());
            tracing::warn!(attempt, error = %error, "Feed dial failed");

            let Some(delay) = policy.record_failure() else {
                tracing::error!(
                    attempts = policy.attempt_count(),
                    error = %error,
                    "Feed dial attempts exhausted"
                );
                self.set_state(ConnectionState::Disconnected);
                return Err(ConnectionError::DialExhausted {
                    attempts: policy.attempt_count(),
                    last_error: error.to_string(),
                });
            };

            tokio::select! {
                () = self.cancel.cancelled() => return Err(ConnectionError::Closed),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn install(&self, stream: WsStream) -> Result<u64, ConnectionError> {
        let (sink, source) = stream.split();
        let mut writer = self.writer.lock().await;
        // `close` takes the writer lock, so this check cannot race it.
        if self.is_closed() {
            tracing::debug!("Feed closed during dial, new socket dropped");
            return Err(ConnectionError::Closed);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *writer = Some(Writer { generation, sink });
        *self.reader.lock() = Some((generation, source));
        self.heartbeat.reset();
        self.live.store(true, Ordering::SeqCst);
        drop(writer);

        self.set_state(ConnectionState::Connected);
        if generation > 1 {
            self.reconnects.fetch_add(1, Ordering::Relaxed);
            metrics::record_reconnect();
        }
        self.generation_tx.send_replace(generation);
        // Wake a read loop parked on the previous socket.
        self.dead.notify_one();

        tracing::info!(generation, url = %self.config.url, "Feed connected");
        Ok(generation)
    }

    /// Mark `generation` dead so the next read or write redials.
    ///
    /// Returns `false` when `generation` is no longer current or was already
    /// dead.
    pub fn mark_dead(&self, generation: u64, reason: &str) -> bool {
        if self.generation() != generation {
            tracing::debug!(generation, current = self.generation(), reason, "Stale failure ignored");
            return false;
        }
        if !self.live.swap(false, Ordering::SeqCst) {
            return false;
        }

        tracing::warn!(generation, reason, "Feed connection marked dead");
        self.record_error(reason);
        if !self.is_closed() {
            self.set_state(ConnectionState::Connecting);
        }
        self.dead.notify_one();
        true
    }

    // -------------------------------------------------------------------------
    // Send
    // -------------------------------------------------------------------------

    /// Write one command on a live socket.
    ///
    /// Returns the generation the command was written on.
    ///
    /// # Errors
    ///
    /// Any [`ConnectionError`] from `ensure_connected`, encoding or the
    /// write itself. A failed write marks the socket dead and is not retried.
    pub async fn send_command(&self, command: Command) -> Result<u64, ConnectionError> {
        self.ensure_connected().await?;
        let text = CommandMessage::from(command).to_json()?;

        let mut writer = self.writer.lock().await;
        let socket = writer.as_mut().ok_or(ConnectionError::Lost)?;
        let generation = socket.generation;
        if generation != self.generation() || !self.is_live() {
            return Err(ConnectionError::Lost);
        }

        match socket.sink.send(Message::Text(text.into())).await {
            Ok(()) => {
                drop(writer);
                metrics::record_command_sent(command.verb());
                tracing::info!(
                    command = command.verb(),
                    channel = %command.channel(),
                    generation,
                    "Command sent"
                );
                Ok(generation)
            }
            Err(e) => {
                drop(writer);
                self.mark_dead(generation, &format!("write failed: {e}"));
                Err(e.into())
            }
        }
    }

    async fn write_control(&self, generation: u64, message: Message) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(socket) if socket.generation == generation => {
                tokio::time::timeout(self.config.probe_timeout, socket.sink.send(message))
                    .await
                    .map_err(|_| ConnectionError::Lost)??;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Read loop
    // -------------------------------------------------------------------------

    /// Read frames until the manager is closed.
    ///
    /// Each text frame is handed to `handler` before the next read. Read
    /// failures mark the socket dead and redial. When a redial exhausts its
    /// attempts the loop logs the error and waits for another caller to
    /// establish a connection.
    pub async fn run_read_loop(&self, handler: &dyn FrameHandler) {
        let mut generations = self.subscribe_generation();

        loop {
            if self.is_closed() {
                break;
            }

            let taken = self.reader.lock().take();
            let (generation, mut source) = match taken {
                Some((generation, source)) if generation == self.generation() && self.is_live() => {
                    (generation, source)
                }
                _ => {
                    match self.ensure_connected().await {
                        Ok(_) => continue,
                        Err(ConnectionError::Closed) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "Feed unavailable, read loop waiting");
                            generations.borrow_and_update();
                            tokio::select! {
                                () = self.cancel.cancelled() => break,
                                changed = generations.changed() => {
                                    if changed.is_err() {
                                        break;
                                    }
                                }
                            }
                            continue;
                        }
                    }
                }
            };

            match self.read_socket(generation, &mut source, handler).await {
                ReadOutcome::Cancelled => break,
                ReadOutcome::Replaced => {
                    tracing::debug!(generation, "Socket replaced, switching reader");
                }
                ReadOutcome::Failed(reason) => {
                    self.mark_dead(generation, &reason);
                }
            }
        }

        tracing::debug!("Read loop stopped");
    }

    async fn read_socket(
        &self,
        generation: u64,
        source: &mut WsSource,
        handler: &dyn FrameHandler,
    ) -> ReadOutcome {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return ReadOutcome::Cancelled,
                () = self.dead.notified() => {
                    if self.generation() != generation || !self.is_live() {
                        return ReadOutcome::Replaced;
                    }
                    continue;
                }
                next = tokio::time::timeout(self.config.read_timeout, source.next()) => next,
            };

            let message = match next {
                Err(_) => {
                    return ReadOutcome::Failed(
                        ConnectionError::ReadTimeout(self.config.read_timeout).to_string(),
                    );
                }
                Ok(None) => return ReadOutcome::Failed("stream ended".to_string()),
                Ok(Some(Err(e))) => return ReadOutcome::Failed(format!("read failed: {e}")),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    self.heartbeat.record_activity();
                    self.frames_received.fetch_add(1, Ordering::Relaxed);
                    handler.on_frame(text.as_str(), Utc::now());
                }
                Message::Binary(data) => {
                    self.heartbeat.record_activity();
                    match std::str::from_utf8(&data) {
                        Ok(text) => {
                            self.frames_received.fetch_add(1, Ordering::Relaxed);
                            handler.on_frame(text, Utc::now());
                        }
                        Err(e) => tracing::warn!(error = %e, "Non UTF-8 binary frame dropped"),
                    }
                }
                Message::Ping(data) => {
                    self.heartbeat.record_activity();
                    if let Err(e) = self.write_control(generation, Message::Pong(data)).await {
                        return ReadOutcome::Failed(format!("pong failed: {e}"));
                    }
                }
                Message::Pong(_) => self.heartbeat.record_pong(),
                Message::Close(frame) => {
                    tracing::info!(generation, frame = ?frame, "Server closed feed connection");
                    return ReadOutcome::Failed("server closed connection".to_string());
                }
                Message::Frame(_) => {}
            }
        }
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Shut down: stop every task, release the socket. Terminal.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }

        *self.state.write() = ConnectionState::Closing;
        metrics::set_connection_state(ConnectionState::Closing.code());
        self.cancel.cancel();

        let taken = {
            let mut writer = self.writer.lock().await;
            self.live.store(false, Ordering::SeqCst);
            writer.take()
        };
        if let Some(mut socket) = taken {
            let close = async {
                socket.sink.send(Message::Close(None)).await?;
                socket.sink.close().await
            };
            if let Err(e) = tokio::time::timeout(self.config.probe_timeout, close)
                .await
                .unwrap_or(Ok(()))
            {
                tracing::debug!(error = %e, "Close handshake failed");
            }
        }
        self.reader.lock().take();

        self.set_state(ConnectionState::Disconnected);
        tracing::info!(generation = self.generation(), "Feed connection closed");
    }
}

#[async_trait]
impl CommandSink for ConnectionManager {
    async fn send(&self, command: Command) -> Result<u64, ConnectionError> {
        self.send_command(command).await
    }

    fn generation(&self) -> u64 {
        Self::generation(self)
    }
}

#[async_trait]
impl KeepaliveTarget for ConnectionManager {
    fn live_generation(&self) -> Option<u64> {
        self.is_live().then(|| self.generation())
    }

    fn heartbeat(&self) -> &HeartbeatState {
        &self.heartbeat
    }

    async fn ping(&self, generation: u64) -> Result<(), ConnectionError> {
        self.write_control(generation, Message::Ping(Vec::new().into()))
            .await
    }

    fn mark_dead(&self, generation: u64, reason: &str) -> bool {
        Self::mark_dead(self, generation, reason)
    }
}

/// Spawn the keepalive task for `manager`.
pub fn spawn_keepalive(
    manager: &Arc<ConnectionManager>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let heartbeat = super::heartbeat::HeartbeatManager::new(
        manager.config.heartbeat.clone(),
        Arc::clone(manager),
        cancel,
    );
    tokio::spawn(heartbeat.run())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config(attempts: u32) -> ConnectionConfig {
        ConnectionConfig {
            // Port 9 on loopback refuses connections.
            url: "ws://127.0.0.1:9".to_string(),
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(100),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts: attempts,
            },
            heartbeat: HeartbeatConfig::default(),
        }
    }

    #[test]
    fn state_codes() {
        assert_eq!(ConnectionState::Disconnected.code(), 0);
        assert_eq!(ConnectionState::Connected.code(), 2);
        assert_eq!(ConnectionState::Closing.as_str(), "closing");
    }

    #[tokio::test]
    async fn exhausted_dial_returns_error() {
        let manager = ConnectionManager::new(unreachable_config(3), CancellationToken::new());

        let err = manager.ensure_connected().await.unwrap_err();

        assert!(matches!(err, ConnectionError::DialExhausted { attempts: 3, .. }));
        assert_eq!(manager.stats().dial_failures, 3);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.generation(), 0);
    }

    #[tokio::test]
    async fn closed_manager_refuses_to_dial() {
        let manager = ConnectionManager::new(unreachable_config(1), CancellationToken::new());
        manager.close().await;

        assert!(matches!(
            manager.ensure_connected().await,
            Err(ConnectionError::Closed)
        ));
        assert!(matches!(
            manager.send_command(Command::Subscribe(crate::domain::directory::ChannelId::TICKER)).await,
            Err(ConnectionError::Closed)
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn stale_generation_is_not_marked_dead() {
        let manager = ConnectionManager::new(ConnectionConfig::default(), CancellationToken::new());
        assert!(!manager.mark_dead(7, "stale"));
    }

    /// Accepts sessions and holds them open without ever reading, so pings
    /// go unanswered.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut sessions = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    sessions.push(ws);
                }
            }
        });
        format!("ws://{addr}")
    }

    fn local_config(url: String) -> ConnectionConfig {
        ConnectionConfig {
            url,
            read_timeout: Duration::from_secs(10),
            ..unreachable_config(3)
        }
    }

    async fn eventually<F: Fn() -> bool>(condition: F) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn stale_failure_after_redial_keeps_new_socket() {
        let manager =
            ConnectionManager::new(local_config(silent_server().await), CancellationToken::new());

        assert_eq!(manager.ensure_connected().await.unwrap(), 1);
        assert!(manager.mark_dead(1, "read failed"));
        assert_eq!(manager.ensure_connected().await.unwrap(), 2);

        assert!(!manager.mark_dead(1, "late keepalive failure"));
        assert!(manager.is_live());
        assert_eq!(manager.generation(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.stats().reconnects, 1);

        manager.close().await;
    }

    #[tokio::test]
    async fn unanswered_keepalive_triggers_redial() {
        let cancel = CancellationToken::new();
        let config = ConnectionConfig {
            heartbeat: HeartbeatConfig {
                ping_interval: Duration::from_millis(20),
                pong_timeout: Duration::from_millis(60),
            },
            ..local_config(silent_server().await)
        };
        let manager = Arc::new(ConnectionManager::new(config, cancel.clone()));
        assert_eq!(manager.ensure_connected().await.unwrap(), 1);

        let keepalive = spawn_keepalive(&manager, cancel.child_token());
        let reader = Arc::clone(&manager);
        let read_loop = tokio::spawn(async move {
            let handler = |_: &str, _: chrono::DateTime<Utc>| {};
            reader.run_read_loop(&handler).await;
        });

        eventually(|| manager.generation() >= 2).await;
        assert!(manager.stats().reconnects >= 1);
        assert!(
            manager
                .stats()
                .last_error
                .is_some_and(|e| e.starts_with("keepalive"))
        );

        manager.close().await;
        keepalive.await.unwrap();
        read_loop.await.unwrap();
    }

    #[tokio::test]
    async fn socket_dialled_during_close_is_dropped() {
        let url = silent_server().await;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let manager = ConnectionManager::new(local_config(url), CancellationToken::new());

        manager.close().await;

        assert!(matches!(
            manager.install(stream).await,
            Err(ConnectionError::Closed)
        ));
        assert!(!manager.is_live());
        assert_eq!(manager.generation(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
