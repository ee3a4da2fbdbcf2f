//! Room connection state machine.
//!
//! [`RoomClient`] owns one session at a time and walks it through
//!
//! ```text
//! Idle ─connect()─> Connecting ─socket open─> Handshaking ─first frame─> Active
//!                        │                         │                       │
//!                        └──────── Failed <────────┘          error / close()
//!                                                                           │
//!                                        Closed <── cleanup ── Closing <────┘
//! ```
//!
//! Each session runs three tasks:
//! - the **read loop**, which decodes frames in arrival order and queues
//!   events for the consumer,
//! - the **heartbeat**, on its own timer,
//! - the **writer**, the only task touching the socket's write half.
//!
//! The [`EventHandler`] itself runs on a dedicated thread per client, outside
//! the async runtime. Heartbeats and caller sends reach the writer through
//! [`OutboundQueue`], so a slow handler never delays a keepalive.
//!
//! There is no reconnect inside the client. Callers re-invoke
//! [`RoomClient::connect`] after `Closed` or `Failed`.

pub mod dispatch;
pub mod heartbeat;
pub mod outbound;

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::api::{RoomDirectory, RoomIdentity};
use crate::config::{Config, ProxyConfig};
use crate::constants::{
    now_millis, CONNECT_TIMEOUT, HEARTBEAT_INTERVAL, STATE_CHANNEL_CAPACITY, USER_AGENT,
    WRITER_CLOSE_TIMEOUT,
};
use crate::error::LiveError;
use crate::protocol::handshake::{build_handshake, PageSessionId};
use crate::protocol::{decode_envelope, encode_envelope, tag_name, Envelope, FeedPush, PayloadType, WatchingUsers};
use crate::ws::{self, SocketFrame, SocketReader};

pub use dispatch::{DecodedEvent, DispatchRecord, EventDispatcher};
pub use heartbeat::Heartbeat;
pub use outbound::{FrameSink, OutboundQueue};

use dispatch::EventSender;

/// Lifecycle state of a [`RoomClient`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Resolving the room and opening the socket.
    Connecting,
    /// Socket open, handshake sent, waiting for the first frame.
    Handshaking,
    /// Frames are flowing.
    Active,
    /// Tearing the session down.
    Closing,
    /// Session ended; `connect()` may be called again.
    Closed,
    /// A connection attempt failed before the session became usable.
    Failed(String),
}

impl ConnectionState {
    /// Whether `connect()` is accepted from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Failed(_))
    }

    /// Whether a session is open for outbound frames.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Handshaking | Self::Active)
    }
}

/// Connection state shared between the client and its session task.
///
/// Every change is also published on a broadcast channel so observers can
/// follow transitions without polling.
#[derive(Debug)]
pub struct SharedConnectionState {
    state: RwLock<ConnectionState>,
    changes: broadcast::Sender<ConnectionState>,
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(ConnectionState::Idle),
            changes,
        }
    }
}

impl SharedConnectionState {
    /// Create new shared state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the state and publish the change.
    pub fn set(&self, new_state: ConnectionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != new_state {
            log::debug!("[Room] State {:?} -> {:?}", *state, new_state);
            *state = new_state.clone();
            let _ = self.changes.send(new_state);
        }
    }

    /// Atomically move to `Connecting` if a connect is allowed.
    ///
    /// Returns the blocking state otherwise.
    fn begin_connect(&self) -> Result<(), ConnectionState> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.can_connect() {
            return Err(state.clone());
        }
        *state = ConnectionState::Connecting;
        let _ = self.changes.send(ConnectionState::Connecting);
        Ok(())
    }

    /// Subscribe to future state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.changes.subscribe()
    }

    /// Check if frames are flowing.
    pub fn is_active(&self) -> bool {
        matches!(self.get(), ConnectionState::Active)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The caller closed the client.
    Requested,
    /// The server sent a close frame.
    ServerClosed {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// Transport failure (read, write or heartbeat).
    Error(String),
}

impl CloseCause {
    /// Whether the session ended abnormally.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl std::fmt::Display for CloseCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "closed by client"),
            Self::ServerClosed { code, reason } if reason.is_empty() => {
                write!(f, "closed by server ({code})")
            }
            Self::ServerClosed { code, reason } => write!(f, "closed by server ({code}: {reason})"),
            Self::Error(msg) => write!(f, "connection error: {msg}"),
        }
    }
}

/// Event handed to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Comments, likes and gifts.
    Chat(FeedPush),
    /// Viewer list and count update.
    WatchingUsers(WatchingUsers),
    /// The session ended. Always the last event of a session.
    Disconnected(CloseCause),
}

/// Consumer of room events.
///
/// Called on the client's event thread, once per event, in arrival order and
/// never concurrently. Blocking here delays later events only; frames keep
/// being read and heartbeats keep going out. Events are queued without bound
/// while the handler is busy.
pub trait EventHandler: Send + 'static {
    /// Handle one event.
    fn on_event(&mut self, event: RoomEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(RoomEvent) + Send + 'static,
{
    fn on_event(&mut self, event: RoomEvent) {
        self(event);
    }
}

/// Per-client connection settings.
#[derive(Debug, Clone)]
pub struct RoomOptions {
    /// Live room page URL, passed to the room directory.
    pub page_url: String,
    /// Optional HTTP proxy for the socket.
    pub proxy: Option<ProxyConfig>,
    /// Keepalive cadence.
    pub heartbeat_interval: Duration,
    /// Bound on opening the socket.
    pub connect_timeout: Duration,
}

impl RoomOptions {
    /// Options for `page_url` with default timings.
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            proxy: None,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Options derived from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_url: config.page_url.clone(),
            proxy: config.proxy(),
            heartbeat_interval: config.heartbeat_interval(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Handles of one running session.
#[derive(Debug)]
struct SessionHandle {
    identity: RoomIdentity,
    outbound: OutboundQueue,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Marks an in-flight `connect()` as failed if its future is dropped.
struct AttemptGuard<'a> {
    state: &'a SharedConnectionState,
    armed: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("[Room] Connect cancelled");
            self.state
                .set(ConnectionState::Failed("connect cancelled".to_string()));
        }
    }
}

/// Client for one live room.
pub struct RoomClient {
    directory: Arc<dyn RoomDirectory>,
    options: RoomOptions,
    state: Arc<SharedConnectionState>,
    events: EventSender,
    session: Mutex<Option<SessionHandle>>,
}

impl std::fmt::Debug for RoomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomClient")
            .field("options", &self.options)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl RoomClient {
    /// Create an idle client. Nothing is resolved or opened until
    /// [`connect`](Self::connect).
    ///
    /// Starts the thread that runs `handler`; it exits once the client and
    /// its last session are gone.
    pub fn new(
        directory: Arc<dyn RoomDirectory>,
        options: RoomOptions,
        handler: impl EventHandler,
    ) -> Self {
        Self {
            directory,
            options,
            state: SharedConnectionState::new(),
            events: dispatch::spawn_consumer(Box::new(handler)),
            session: Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Subscribe to state transitions.
    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Shared state handle, for observers that outlive a borrow.
    pub fn shared_state(&self) -> Arc<SharedConnectionState> {
        Arc::clone(&self.state)
    }

    /// Room resolved for the current or last session.
    pub fn room_identity(&self) -> Option<RoomIdentity> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.identity.clone())
    }

    /// Resolve the room, open the socket, send the handshake and start the
    /// session.
    ///
    /// Returns once the handshake is written; the state becomes `Active`
    /// when the first frame arrives. Dropping the returned future cancels
    /// the attempt and leaves the client `Failed`.
    ///
    /// # Errors
    ///
    /// - [`LiveError::AlreadyConnected`] unless the state is `Idle`, `Closed`
    ///   or `Failed`.
    /// - Directory errors ([`LiveError::NotLive`],
    ///   [`LiveError::SessionInvalid`], [`LiveError::Request`]), in which
    ///   case no socket is opened.
    /// - [`LiveError::Transport`] if the socket cannot be opened within the
    ///   connect timeout or the handshake write fails.
    pub async fn connect(&self) -> Result<(), LiveError> {
        self.state
            .begin_connect()
            .map_err(LiveError::AlreadyConnected)?;

        let mut guard = AttemptGuard {
            state: &self.state,
            armed: true,
        };
        let result = self.establish().await;
        guard.armed = false;

        match result {
            Ok(session) => {
                let previous = self
                    .session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(session);
                drop(previous);
                Ok(())
            }
            Err(e) => {
                log::error!("[Room] Connect failed: {e}");
                self.state.set(ConnectionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<SessionHandle, LiveError> {
        let room_id = self.directory.resolve_room_id(&self.options.page_url).await?;
        let endpoint = self.directory.resolve_socket_endpoint(&room_id).await?;
        let page_id = PageSessionId::generate(now_millis());
        log::info!(
            "[Room] Connecting room={} url={} page={}",
            room_id,
            endpoint.url,
            page_id
        );

        let open = ws::connect(&endpoint.url, USER_AGENT, self.options.proxy.as_ref());
        let (mut writer, reader) = tokio::time::timeout(self.options.connect_timeout, open)
            .await
            .map_err(|_| {
                LiveError::Transport(format!(
                    "socket open timed out after {:?}",
                    self.options.connect_timeout
                ))
            })?
            .map_err(|e| LiveError::Transport(format!("{e:#}")))?;

        self.state.set(ConnectionState::Handshaking);

        let handshake = encode_envelope(&build_handshake(&endpoint.token, &room_id, &page_id)?)?;
        writer
            .binary(handshake)
            .await
            .map_err(|e| LiveError::Transport(format!("{e:#}")))?;
        log::info!("[Room] Handshake sent room={room_id}");

        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let (outbound, writer_task) = OutboundQueue::spawn(writer, fault_tx.clone());
        let heartbeat = Heartbeat::start(
            Arc::new(outbound.clone()),
            self.options.heartbeat_interval,
            fault_tx,
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session = Session {
            dispatcher: EventDispatcher::new(room_id.clone(), self.events.clone()),
            state: Arc::clone(&self.state),
            reader,
            outbound: outbound.clone(),
            writer_task,
            heartbeat,
            fault_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(session.run());

        Ok(SessionHandle {
            identity: RoomIdentity {
                room_id,
                websocket_url: endpoint.url,
            },
            outbound,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Queue an envelope on the open session.
    ///
    /// # Errors
    ///
    /// [`LiveError::NotConnected`] without an open session, or a transport
    /// error from the writer.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), LiveError> {
        if !self.state.get().is_open() {
            return Err(LiveError::NotConnected);
        }
        let outbound = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.outbound.clone())
            .ok_or(LiveError::NotConnected)?;
        outbound.send_frame(encode_envelope(envelope)?).await
    }

    /// Close the session and wait for teardown.
    ///
    /// On return the heartbeat is stopped, the socket released and the state
    /// is `Closed`. A no-op without a session.
    pub async fn close(&self) {
        let taken = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .map(|s| (s.shutdown_tx.take(), s.task.take()));

        let Some((shutdown_tx, task)) = taken else {
            return;
        };
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("[Room] Session task ended abnormally: {e}");
                self.state.set(ConnectionState::Closed);
            }
        }
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = session.as_mut().and_then(|s| s.shutdown_tx.take()) {
            let _ = tx.send(());
        }
    }
}

/// State owned by one session's read loop.
struct Session {
    dispatcher: EventDispatcher,
    state: Arc<SharedConnectionState>,
    reader: SocketReader,
    outbound: OutboundQueue,
    writer_task: JoinHandle<()>,
    heartbeat: Heartbeat,
    fault_rx: mpsc::UnboundedReceiver<LiveError>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl Session {
    async fn run(mut self) {
        let cause = self.read_loop().await;
        self.teardown(cause).await;
    }

    async fn read_loop(&mut self) -> CloseCause {
        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => return CloseCause::Requested,

                fault = self.fault_rx.recv() => {
                    let reason = fault.map_or_else(
                        || "session tasks stopped".to_string(),
                        |fault| fault.to_string(),
                    );
                    return CloseCause::Error(reason);
                }

                reason = self.heartbeat.exited() => return CloseCause::Error(reason),

                msg = self.reader.recv() => match msg {
                    Some(Ok(SocketFrame::Binary(data))) => self.on_frame(&data),
                    Some(Ok(SocketFrame::Ping(data))) => self.outbound.pong(data).await,
                    Some(Ok(SocketFrame::Ignored { kind, len })) => {
                        log::trace!(
                            "[Room] room={} ignoring {kind} message ({len} bytes)",
                            self.dispatcher.room_id()
                        );
                    }
                    Some(Ok(SocketFrame::Close { code, reason })) => {
                        return CloseCause::ServerClosed { code, reason };
                    }
                    Some(Err(e)) => return CloseCause::Error(format!("{e:#}")),
                    None => return CloseCause::Error("stream ended without close frame".to_string()),
                },
            }
        }
    }

    fn on_frame(&mut self, data: &[u8]) {
        let envelope = match decode_envelope(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!(
                    "[Room] room={} type=? dropping {} byte frame: {}",
                    self.dispatcher.room_id(),
                    data.len(),
                    e
                );
                return;
            }
        };

        if self.state.get() == ConnectionState::Handshaking {
            if envelope.kind() != Some(PayloadType::ScEnterRoomAck) {
                log::warn!(
                    "[Room] room={} first frame is type={} ({}), not the entry ack",
                    self.dispatcher.room_id(),
                    envelope.payload_type,
                    tag_name(envelope.payload_type)
                );
            }
            self.state.set(ConnectionState::Active);
            log::info!("[Room] room={} active", self.dispatcher.room_id());
        }

        self.dispatcher.dispatch(envelope);
    }

    async fn teardown(mut self, cause: CloseCause) {
        self.state.set(ConnectionState::Closing);

        self.heartbeat.stop().await;
        drop(self.reader);

        if tokio::time::timeout(WRITER_CLOSE_TIMEOUT, self.outbound.close())
            .await
            .is_err()
        {
            log::warn!("[Room] Writer queue full at close");
        }
        if tokio::time::timeout(WRITER_CLOSE_TIMEOUT, &mut self.writer_task)
            .await
            .is_err()
        {
            log::warn!("[Room] Writer did not finish, aborting");
            self.writer_task.abort();
        }

        self.state.set(ConnectionState::Closed);
        if cause.is_error() {
            log::warn!("[Room] room={} {}", self.dispatcher.room_id(), cause);
        } else {
            log::info!("[Room] room={} {}", self.dispatcher.room_id(), cause);
        }
        self.dispatcher.deliver(RoomEvent::Disconnected(cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_allowed_states() {
        assert!(ConnectionState::Idle.can_connect());
        assert!(ConnectionState::Closed.can_connect());
        assert!(ConnectionState::Failed("x".into()).can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Handshaking.can_connect());
        assert!(!ConnectionState::Active.can_connect());
        assert!(!ConnectionState::Closing.can_connect());
    }

    #[test]
    fn test_shared_state_publishes_changes_once() {
        let shared = SharedConnectionState::new();
        let mut rx = shared.subscribe();

        shared.set(ConnectionState::Connecting);
        shared.set(ConnectionState::Connecting);
        shared.set(ConnectionState::Active);

        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Connecting);
        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Active);
        assert!(rx.try_recv().is_err());
        assert!(shared.is_active());
    }

    #[test]
    fn test_begin_connect_rejects_open_session() {
        let shared = SharedConnectionState::new();
        assert!(shared.begin_connect().is_ok());
        assert_eq!(shared.begin_connect(), Err(ConnectionState::Connecting));

        shared.set(ConnectionState::Closed);
        assert!(shared.begin_connect().is_ok());
    }

    #[test]
    fn test_cancelled_attempt_marks_failed() {
        let shared = SharedConnectionState::new();
        shared.set(ConnectionState::Connecting);
        {
            let _guard = AttemptGuard {
                state: &shared,
                armed: true,
            };
        }
        assert!(matches!(shared.get(), ConnectionState::Failed(_)));
    }

    #[test]
    fn test_close_cause_display() {
        assert_eq!(CloseCause::Requested.to_string(), "closed by client");
        assert_eq!(
            CloseCause::ServerClosed {
                code: 1000,
                reason: String::new()
            }
            .to_string(),
            "closed by server (1000)"
        );
        assert!(CloseCause::Error("reset".into()).is_error());
        assert!(!CloseCause::Requested.is_error());
    }

    #[test]
    fn test_closure_is_an_event_handler() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut handler: Box<dyn EventHandler> = Box::new(move |_event: RoomEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        handler.on_event(RoomEvent::Disconnected(CloseCause::Requested));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
