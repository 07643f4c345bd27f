//! Streaming connection with a fixed-backoff reconnect policy.
//!
//! The [`ConnectionManager`] owns one logical connection to the backend
//! and a background task that keeps it alive:
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Open
//!                                 |  ^             |
//!                      handshake  |  | backoff     | close / error
//!                         failed  v  | elapsed     v
//!                              ReconnectWait <-----+
//!
//! close() from any state --> Disconnected
//! ```
//!
//! Decoded frames are delivered through the receiver returned by
//! [`ConnectionManager::messages`]. Every state change is published on a
//! broadcast channel as a [`StateTransition`], and the current state is
//! readable through a watch channel.
//!
//! The transport is abstracted by [`Connector`] so the reconnect policy can
//! be exercised against a scripted transport. [`WsConnector`] is the
//! production WebSocket client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use gunshot_core::config::{ConfigError, DashboardConfig};
use gunshot_types::{ConnectionState, StreamMessage, decode_frame};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::error::StreamError;

/// Capacity of the state transition broadcast channel.
///
/// Slow subscribers receive a [`broadcast::error::RecvError::Lagged`] and
/// skip ahead.
const TRANSITION_CAPACITY: usize = 64;

/// Handshake timeout used by [`WsConnector::new`].
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Ping interval used by [`WsConnector::new`].
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);

/// Read silence after which [`WsConnector`] reports the connection lost.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Opens a connection to the backend and yields its text frames.
///
/// The returned stream ends (or yields an error) when the connection is
/// lost. Binary frames, pings, and other control traffic are the
/// connector's business and never reach the manager.
pub trait Connector: Send + Sync + 'static {
    /// Stream of inbound text frames for one connection.
    type Stream: Stream<Item = Result<String, StreamError>> + Send + Unpin + 'static;

    /// Perform the handshake.
    fn connect(&self) -> impl Future<Output = Result<Self::Stream, StreamError>> + Send;
}

/// WebSocket transport backed by `tokio-tungstenite`.
///
/// The handshake is bounded by a timeout. Once open, the connector pings
/// the peer every keepalive interval and ends the frame stream with a
/// transport error when nothing at all (data, ping, or pong) has been read
/// for the idle timeout, so a half-open peer is detected.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    handshake_timeout: Duration,
    keepalive: Duration,
    idle_timeout: Duration,
}

impl WsConnector {
    /// Create a connector for a `ws://` or `wss://` URL with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Create a connector for the configured stream endpoint and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the backend URL has no
    /// supported scheme.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.backend.stream_url()?).with_timeouts(
            config.timing.handshake_timeout(),
            config.timing.keepalive(),
            config.timing.idle_timeout(),
        ))
    }

    /// Replace the handshake, keepalive, and idle timeouts.
    #[must_use]
    pub const fn with_timeouts(
        mut self,
        handshake_timeout: Duration,
        keepalive: Duration,
        idle_timeout: Duration,
    ) -> Self {
        self.handshake_timeout = handshake_timeout;
        self.keepalive = keepalive;
        self.idle_timeout = idle_timeout;
        self
    }

    /// The endpoint this connector dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    type Stream = BoxStream<'static, Result<String, StreamError>>;

    async fn connect(&self) -> Result<Self::Stream, StreamError> {
        info!(url = %self.url, "connecting to event stream");
        let (socket, _response) =
            tokio::time::timeout(self.handshake_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|e| {
                    StreamError::Handshake(format!(
                        "no handshake from {} within {:?}: {e}",
                        self.url, self.handshake_timeout
                    ))
                })?
                .map_err(|e| {
                    StreamError::Handshake(format!("failed to connect to {}: {e}", self.url))
                })?;
        info!(url = %self.url, "event stream connected");

        let (sink, frames) = socket.split();
        let reader = Reader {
            frames,
            idle_timeout: self.idle_timeout,
            _pinger: PingerGuard(tokio::spawn(ping(sink, self.keepalive))),
            finished: false,
        };
        Ok(stream::unfold(reader, next_text).boxed())
    }
}

/// Read half of an open WebSocket plus the task pinging through the write half.
struct Reader<S> {
    frames: S,
    idle_timeout: Duration,
    _pinger: PingerGuard,
    finished: bool,
}

/// Stops the ping task when the reader is dropped.
struct PingerGuard(JoinHandle<()>);

impl Drop for PingerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Send a ping every `every` until the write half fails.
async fn ping<S>(mut sink: S, every: Duration)
where
    S: Sink<Message> + Unpin,
{
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
            debug!("keepalive ping failed; write half closed");
            return;
        }
    }
}

/// Next text frame, skipping control traffic, bounded by the idle timeout.
async fn next_text<S>(mut reader: Reader<S>) -> Option<(Result<String, StreamError>, Reader<S>)>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    if reader.finished {
        return None;
    }
    loop {
        let Ok(next) = tokio::time::timeout(reader.idle_timeout, reader.frames.next()).await
        else {
            reader.finished = true;
            let silence = reader.idle_timeout;
            return Some((
                Err(StreamError::Transport(format!("no traffic for {silence:?}"))),
                reader,
            ));
        };
        let item = match next? {
            Ok(Message::Text(text)) => Ok(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Ok(text),
                Err(e) => {
                    warn!(error = %e, "skipping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                reader.finished = true;
                let reason = frame.map_or_else(
                    || "no close frame".to_owned(),
                    |f| format!("{} {}", f.code, f.reason.as_str()),
                );
                Err(StreamError::Closed(reason))
            }
            // Pings, pongs, and raw frames only prove the peer is alive.
            Ok(_) => continue,
            Err(e) => {
                reader.finished = true;
                Err(StreamError::Transport(e.to_string()))
            }
        };
        return Some((item, reader));
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// One edge of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// State before the edge.
    pub from: ConnectionState,
    /// State after the edge.
    pub to: ConnectionState,
    /// When the edge was taken.
    pub at: Instant,
}

/// The reconnect policy as a plain state machine.
///
/// Holds at most one outstanding reconnect deadline. Every method returns
/// the transition it took, or `None` if the input is not valid in the
/// current state.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    state: ConnectionState,
    backoff: Duration,
    deadline: Option<Instant>,
}

impl ReconnectMachine {
    /// A disconnected machine with the given fixed backoff.
    pub const fn new(backoff: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff,
            deadline: None,
        }
    }

    /// Current state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// When the pending reconnect fires, if one is pending.
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Disconnected -> Connecting`.
    pub fn connect_requested(&mut self, now: Instant) -> Option<StateTransition> {
        (self.state == ConnectionState::Disconnected)
            .then(|| self.enter(ConnectionState::Connecting, now))
    }

    /// `Connecting -> Open`.
    pub fn handshake_succeeded(&mut self, now: Instant) -> Option<StateTransition> {
        (self.state == ConnectionState::Connecting).then(|| self.enter(ConnectionState::Open, now))
    }

    /// `Connecting -> ReconnectWait`, arming the backoff.
    pub fn handshake_failed(&mut self, now: Instant) -> Option<StateTransition> {
        (self.state == ConnectionState::Connecting).then(|| self.wait(now))
    }

    /// `Open -> ReconnectWait`, arming the backoff.
    pub fn connection_lost(&mut self, now: Instant) -> Option<StateTransition> {
        (self.state == ConnectionState::Open).then(|| self.wait(now))
    }

    /// `ReconnectWait -> Connecting` once the deadline has passed.
    pub fn backoff_elapsed(&mut self, now: Instant) -> Option<StateTransition> {
        let due = self.deadline.is_some_and(|deadline| now >= deadline);
        (self.state == ConnectionState::ReconnectWait && due)
            .then(|| self.enter(ConnectionState::Connecting, now))
    }

    /// Any state `-> Disconnected`, cancelling a pending reconnect.
    pub fn close(&mut self, now: Instant) -> Option<StateTransition> {
        (self.state != ConnectionState::Disconnected)
            .then(|| self.enter(ConnectionState::Disconnected, now))
    }

    fn wait(&mut self, now: Instant) -> StateTransition {
        let transition = self.enter(ConnectionState::ReconnectWait, now);
        // Unrepresentable deadline: retry on the next loop turn.
        self.deadline = Some(now.checked_add(self.backoff).unwrap_or(now));
        transition
    }

    fn enter(&mut self, to: ConnectionState, at: Instant) -> StateTransition {
        let from = self.state;
        self.state = to;
        self.deadline = None;
        StateTransition { from, to, at }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Settings for a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Fixed delay before each reconnect attempt.
    pub backoff: Duration,
    /// Capacity of the inbound message channel.
    pub channel_capacity: usize,
}

impl ConnectionSettings {
    /// Build settings from the `timing` config section.
    pub const fn from_config(config: &DashboardConfig) -> Self {
        Self {
            backoff: config.timing.reconnect_backoff(),
            channel_capacity: config.timing.channel_capacity,
        }
    }
}

/// State published to observers of the connection.
#[derive(Debug)]
struct Shared {
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<StateTransition>,
}

impl Shared {
    fn publish(&self, transition: Option<StateTransition>) {
        let Some(transition) = transition else {
            return;
        };
        info!(
            from = %transition.from,
            to = %transition.to,
            "connection state changed"
        );
        self.state.send_replace(transition.to);
        // No subscribers is fine.
        let _ = self.transitions.send(transition);
    }
}

/// Owner of the streaming connection and its reconnect task.
///
/// A manager can be connected, closed, and connected again. Every run
/// delivers into the same inbound channel.
pub struct ConnectionManager<C: Connector = WsConnector> {
    connector: Arc<C>,
    settings: ConnectionSettings,
    shared: Arc<Shared>,
    inbound_tx: mpsc::Sender<StreamMessage>,
    inbound_rx: Option<mpsc::Receiver<StreamMessage>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager. Nothing is dialed until [`Self::connect`].
    pub fn new(connector: C, settings: ConnectionSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(settings.channel_capacity.max(1));
        Self {
            connector: Arc::new(connector),
            settings,
            shared: Arc::new(Shared { state, transitions }),
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            shutdown: None,
            task: None,
        }
    }

    /// Start the connection task.
    ///
    /// The manager owns a single logical connection; calling this while
    /// the task is running does nothing. After [`Self::close`] it starts
    /// a fresh task from `Disconnected`.
    pub fn connect(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("connect called while the connection task is running");
            return;
        }
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let machine = ReconnectMachine::new(self.settings.backoff);
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(drive(
            Arc::clone(&self.connector),
            machine,
            Arc::clone(&self.shared),
            self.inbound_tx.clone(),
            shutdown_rx,
        )));
    }

    /// Take the receiver of decoded inbound messages.
    ///
    /// There is exactly one receiver; later calls return `None`.
    pub fn messages(&mut self) -> Option<mpsc::Receiver<StreamMessage>> {
        self.inbound_rx.take()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch the connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to every state transition from now on.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.shared.transitions.subscribe()
    }

    /// Tear the connection down and wait for the task to finish.
    ///
    /// Cancels any pending reconnect. The state is `Disconnected` when
    /// this returns.
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already be gone.
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }
        debug!("connection manager closed");
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// `close()` was called.
    Shutdown,
    /// The connection failed or the peer closed it.
    Lost(String),
    /// Nobody is reading inbound messages any more.
    ReceiverGone,
}

/// Connection task: runs the state machine until shutdown.
async fn drive<C: Connector>(
    connector: Arc<C>,
    mut machine: ReconnectMachine,
    shared: Arc<Shared>,
    inbound: mpsc::Sender<StreamMessage>,
    mut shutdown: oneshot::Receiver<()>,
) {
    shared.publish(machine.connect_requested(Instant::now()));

    loop {
        match machine.state() {
            ConnectionState::Connecting => {
                let attempt = tokio::select! {
                    _ = &mut shutdown => break,
                    attempt = connector.connect() => attempt,
                };
                match attempt {
                    Ok(mut frames) => {
                        shared.publish(machine.handshake_succeeded(Instant::now()));
                        match session(&mut frames, &inbound, &mut shutdown).await {
                            SessionEnd::Shutdown => break,
                            SessionEnd::ReceiverGone => {
                                warn!("inbound receiver dropped; stopping connection task");
                                break;
                            }
                            SessionEnd::Lost(reason) => {
                                warn!(reason = %reason, "event stream lost");
                                shared.publish(machine.connection_lost(Instant::now()));
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "event stream handshake failed");
                        shared.publish(machine.handshake_failed(Instant::now()));
                    }
                }
            }
            ConnectionState::ReconnectWait => {
                let deadline = machine.deadline().unwrap_or_else(Instant::now);
                debug!(
                    wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis(),
                    "waiting before reconnect"
                );
                tokio::select! {
                    _ = &mut shutdown => break,
                    () = tokio::time::sleep_until(deadline) => {
                        shared.publish(machine.backoff_elapsed(Instant::now()));
                    }
                }
            }
            ConnectionState::Open | ConnectionState::Disconnected => break,
        }
    }

    shared.publish(machine.close(Instant::now()));
}

/// Pump frames from one open connection into the inbound channel.
async fn session<S>(
    frames: &mut S,
    inbound: &mpsc::Sender<StreamMessage>,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = &mut *shutdown => return SessionEnd::Shutdown,
            frame = frames.next() => frame,
        };
        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
            None => return SessionEnd::Lost("stream ended".to_owned()),
        };
        let message = match decode_frame(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, bytes = text.len(), "dropping undecodable frame");
                continue;
            }
        };
        debug!(kind = message.kind(), records = message.len(), "frame decoded");
        tokio::select! {
            _ = &mut *shutdown => return SessionEnd::Shutdown,
            sent = inbound.send(message) => {
                if sent.is_err() {
                    return SessionEnd::ReceiverGone;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    const BACKOFF: Duration = Duration::from_secs(5);

    #[test]
    fn happy_path_edges() {
        let now = Instant::now();
        let mut machine = ReconnectMachine::new(BACKOFF);
        let edge = machine.connect_requested(now);
        assert_eq!(
            edge.map(|t| (t.from, t.to)),
            Some((ConnectionState::Disconnected, ConnectionState::Connecting))
        );
        assert!(machine.handshake_succeeded(now).is_some());
        assert_eq!(machine.state(), ConnectionState::Open);
        assert!(machine.deadline().is_none());
    }

    #[test]
    fn drop_arms_exactly_one_deadline() {
        let now = Instant::now();
        let mut machine = ReconnectMachine::new(BACKOFF);
        machine.connect_requested(now);
        machine.handshake_succeeded(now);
        assert!(machine.connection_lost(now).is_some());
        assert_eq!(machine.deadline(), Some(now + BACKOFF));

        // A second loss report while waiting is not a valid edge.
        assert!(machine.connection_lost(now).is_none());
        assert_eq!(machine.deadline(), Some(now + BACKOFF));
    }

    #[test]
    fn backoff_fires_only_after_deadline() {
        let now = Instant::now();
        let mut machine = ReconnectMachine::new(BACKOFF);
        machine.connect_requested(now);
        machine.handshake_failed(now);
        assert_eq!(machine.state(), ConnectionState::ReconnectWait);

        assert!(machine.backoff_elapsed(now + Duration::from_millis(4_999)).is_none());
        let edge = machine.backoff_elapsed(now + BACKOFF);
        assert_eq!(
            edge.map(|t| (t.from, t.to)),
            Some((ConnectionState::ReconnectWait, ConnectionState::Connecting))
        );
        assert!(machine.deadline().is_none());
    }

    #[test]
    fn close_cancels_pending_reconnect() {
        let now = Instant::now();
        let mut machine = ReconnectMachine::new(BACKOFF);
        machine.connect_requested(now);
        machine.handshake_failed(now);
        assert!(machine.close(now).is_some());
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(machine.deadline().is_none());
        assert!(machine.backoff_elapsed(now + BACKOFF).is_none());
        assert!(machine.close(now).is_none());
    }

    #[test]
    fn invalid_inputs_are_ignored() {
        let now = Instant::now();
        let mut machine = ReconnectMachine::new(BACKOFF);
        assert!(machine.handshake_succeeded(now).is_none());
        assert!(machine.connection_lost(now).is_none());
        assert!(machine.backoff_elapsed(now).is_none());
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }
}
