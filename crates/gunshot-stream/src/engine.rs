//! The engine task: single writer for the store, the viewport, and the
//! observed connection state.
//!
//! # Architecture
//!
//! ```text
//! Feed (stream | poll) --messages--> Engine task --watch--> DashboardView
//!                                        ^
//! EngineHandle ----------commands--------+
//! ```
//!
//! The task processes one inbound message, command, or timer firing to
//! completion before taking the next, then republishes the derived view.
//! Timers are the render tick (so time windows advance without input)
//! and the highlight deadline.

use std::future::pending;
use std::time::Duration;

use chrono::TimeDelta;
use gunshot_core::confidence::{HIGHLIGHT_RADIUS_M, confidence_radius};
use gunshot_core::config::{DashboardConfig, FeedKind};
use gunshot_core::focus::{FocusController, FocusSettings};
use gunshot_core::store::{EventStore, MergeMode};
use gunshot_core::window;
use gunshot_types::{
    ConnectionState, DashboardView, EventId, GunshotEvent, LatLon, MicId, RenderedEvent,
    Sensor, StreamMessage, ViewState, WindowPolicy,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::MonotonicClock;
use crate::connection::{ConnectionManager, ConnectionSettings, Connector, WsConnector};
use crate::error::StreamError;
use crate::poller::Poller;

// ---------------------------------------------------------------------------
// Settings and commands
// ---------------------------------------------------------------------------

/// Engine tunables, resolved from config.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Window policy active at start.
    pub policy: WindowPolicy,
    /// Forward slack on the window's upper bound.
    pub skew: TimeDelta,
    /// Interval between view rebuilds with no other activity.
    pub render_interval: Duration,
    /// Viewport before anything has been selected or received.
    pub initial_view: ViewState,
    /// Focus controller tunables.
    pub focus: FocusSettings,
    /// How stream event batches merge into the store. Fixed at start.
    pub merge_mode: MergeMode,
    /// Capacity of the command channel.
    pub channel_capacity: usize,
}

impl EngineSettings {
    /// Resolve settings from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] if the window policy is invalid.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, StreamError> {
        Ok(Self {
            policy: config.window_policy()?,
            skew: config.timing.skew_tolerance(),
            render_interval: config.timing.render_interval(),
            initial_view: ViewState::at(config.view.default_center(), config.view.default_zoom),
            focus: FocusSettings::from_config(config),
            merge_mode: config.merge_mode(),
            channel_capacity: config.timing.channel_capacity,
        })
    }
}

/// Requests from the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Recentre on an arbitrary point, optionally highlighting an event.
    Select {
        /// Where to move the map.
        target: LatLon,
        /// Zoom level to land on.
        zoom: u8,
        /// Event to highlight, or `None` to clear the highlight.
        highlight: Option<EventId>,
    },
    /// Recentre on a stored event at focus zoom and highlight it.
    SelectEvent(EventId),
    /// Recentre on a roster sensor at focus zoom.
    SelectSensor(MicId),
    /// Switch the active window policy.
    SetPolicy(WindowPolicy),
    /// The renderer performed the armed transition.
    AcknowledgeTransition,
    /// Stop the engine and its feed.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// The engine's single source of inbound messages.
pub enum Feed<C: Connector = WsConnector> {
    /// Push feed over a streaming connection.
    Stream(ConnectionManager<C>),
    /// Periodic HTTP pulls.
    Poll(Poller),
}

impl<C: Connector> Feed<C> {
    fn start(&mut self) {
        match self {
            Self::Stream(manager) => manager.connect(),
            Self::Poll(poller) => poller.start(),
        }
    }

    fn messages(&mut self) -> Option<mpsc::Receiver<StreamMessage>> {
        match self {
            Self::Stream(manager) => manager.messages(),
            Self::Poll(poller) => poller.messages(),
        }
    }

    fn connection(&self) -> Option<watch::Receiver<ConnectionState>> {
        match self {
            Self::Stream(manager) => Some(manager.watch_state()),
            Self::Poll(_) => None,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Stream(manager) => manager.close().await,
            Self::Poll(poller) => poller.close().await,
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Poll(_) => "poll",
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// State owned by the engine task.
pub struct Engine<C: Connector = WsConnector> {
    settings: EngineSettings,
    feed: Feed<C>,
    store: EventStore,
    focus: FocusController,
    policy: WindowPolicy,
    clock: MonotonicClock,
    connection: Option<ConnectionState>,
    view_tx: watch::Sender<DashboardView>,
}

impl Engine {
    /// Build the feed named by `config` and spawn the engine.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] if the config fails validation.
    pub fn start(config: &DashboardConfig) -> Result<EngineHandle, StreamError> {
        config.validate()?;
        let settings = EngineSettings::from_config(config)?;
        let feed = match config.backend.feed {
            FeedKind::Stream => Feed::Stream(ConnectionManager::new(
                WsConnector::from_config(config)?,
                ConnectionSettings::from_config(config),
            )),
            FeedKind::Poll => Feed::Poll(Poller::from_config(config)),
        };
        Ok(Self::spawn(settings, feed))
    }
}

impl<C: Connector> Engine<C> {
    /// Start `feed` and spawn the engine task over it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(settings: EngineSettings, mut feed: Feed<C>) -> EngineHandle {
        feed.start();
        let inbound = feed.messages();
        let connection_rx = feed.connection();
        let connection = connection_rx.as_ref().map(|rx| *rx.borrow());

        let initial = DashboardView {
            connection,
            ..DashboardView::empty(
                settings.initial_view.clone(),
                settings.policy,
                HIGHLIGHT_RADIUS_M,
            )
        };
        let (view_tx, view_rx) = watch::channel(initial);
        let (command_tx, command_rx) = mpsc::channel(settings.channel_capacity.max(1));

        info!(
            feed = feed.name(),
            policy = %settings.policy,
            merge_mode = ?settings.merge_mode,
            "engine starting"
        );
        let engine = Self {
            focus: FocusController::new(settings.initial_view.clone(), settings.focus),
            policy: settings.policy,
            settings,
            feed,
            store: EventStore::new(),
            clock: MonotonicClock::start(),
            connection,
            view_tx,
        };
        let task = tokio::spawn(engine.run(command_rx, inbound, connection_rx));

        EngineHandle {
            commands: command_tx,
            view: view_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: Option<mpsc::Receiver<StreamMessage>>,
        mut connection: Option<watch::Receiver<ConnectionState>>,
    ) {
        let mut render = tokio::time::interval(self.settings.render_interval.max(Duration::from_millis(1)));
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.publish();

        loop {
            let highlight_at = self
                .focus
                .highlight_deadline()
                .map(|until| self.clock.instant_at(until));

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                message = next_message(inbound.as_mut()) => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        warn!("feed closed; no further updates");
                        inbound = None;
                    }
                },
                state = next_state(connection.as_mut()) => match state {
                    Some(state) => self.connection = Some(state),
                    None => connection = None,
                },
                () = sleep_until(highlight_at) => {
                    self.focus.expire_highlight(self.clock.now());
                }
                _ = render.tick() => {}
            }

            self.publish();
        }

        info!("engine shutting down");
        self.feed.close().await;
        if let Some(rx) = &connection {
            self.connection = Some(*rx.borrow());
        }
        self.publish();
        info!("engine stopped");
    }

    fn handle_message(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Roster(sensors) => {
                info!(count = sensors.len(), "sensor roster updated");
                self.store.merge_roster(sensors);
            }
            StreamMessage::Events(batch) => {
                let received = batch.len();
                let mode = self.merge_mode();
                let outcome = self.store.merge_events(batch, mode, self.clock.now());
                info!(
                    received,
                    inserted = outcome.inserted,
                    stored = self.store.events().len(),
                    "event batch applied"
                );
                if let Some(latest) = self.store.latest() {
                    self.focus.on_newest_event(latest);
                }
            }
        }
    }

    /// Pulls always carry the backend's full list; the stream's contract
    /// is fixed by the settings. The window policy never enters into it.
    const fn merge_mode(&self) -> MergeMode {
        match &self.feed {
            Feed::Poll(_) => MergeMode::Replace,
            Feed::Stream(_) => self.settings.merge_mode,
        }
    }

    fn handle_command(&mut self, command: Command) {
        let now = self.clock.now();
        let focus_zoom = self.focus.settings().focus_zoom;
        match command {
            Command::Select {
                target,
                zoom,
                highlight,
            } => self.focus.on_manual_select(target, zoom, highlight, now),
            Command::SelectEvent(id) => {
                match self.store.event(&id).map(GunshotEvent::position) {
                    Some(target) => self.focus.on_manual_select(target, focus_zoom, Some(id), now),
                    None => warn!(event_id = %id, "selected event is not in the store"),
                }
            }
            Command::SelectSensor(mic_id) => {
                let target = self
                    .store
                    .sensors()
                    .iter()
                    .find(|sensor| sensor.mic_id == mic_id)
                    .map(Sensor::position);
                match target {
                    Some(target) => self.focus.on_manual_select(target, focus_zoom, None, now),
                    None => warn!(mic_id = %mic_id, "selected sensor is not in the roster"),
                }
            }
            Command::SetPolicy(policy) => {
                // View only; stored data and the merge contract are untouched.
                info!(from = %self.policy, to = %policy, "window policy changed");
                self.policy = policy;
            }
            Command::AcknowledgeTransition => {
                if self.focus.take_transition().is_some() {
                    debug!("view transition acknowledged");
                }
            }
            Command::Shutdown => {}
        }
    }

    fn render(&self) -> DashboardView {
        let now = self.clock.now();
        let visible = window::apply(
            self.store.sensors(),
            self.store.events(),
            self.policy,
            now,
            self.settings.skew,
        );
        let view = self.focus.view().clone();
        let highlighted = view.highlighted_event_id.as_ref();
        let events = visible
            .events
            .into_iter()
            .map(|event| RenderedEvent {
                confidence_radius_m: confidence_radius(&event),
                highlighted: highlighted == Some(&event.id),
                event,
            })
            .collect();

        DashboardView {
            sensors: visible.sensors,
            events,
            view,
            connection: self.connection,
            policy: self.policy,
            highlight_radius_m: HIGHLIGHT_RADIUS_M,
            generated_at: now,
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.render());
    }
}

async fn next_message(rx: Option<&mut mpsc::Receiver<StreamMessage>>) -> Option<StreamMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn next_state(rx: Option<&mut watch::Receiver<ConnectionState>>) -> Option<ConnectionState> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => pending().await,
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Presentation-layer handle to a running engine.
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<DashboardView>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// The most recently published view.
    pub fn view(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    /// A receiver notified on every republish.
    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }

    /// Send a command to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EngineStopped`] if the engine task has ended.
    pub async fn send(&self, command: Command) -> Result<(), StreamError> {
        self.commands.send(command).await.map_err(|e| {
            debug!(command = ?e.0, "engine is not accepting commands");
            StreamError::EngineStopped
        })
    }

    /// Recentre on a point, optionally highlighting an event.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EngineStopped`] if the engine task has ended.
    pub async fn select(
        &self,
        target: LatLon,
        zoom: u8,
        highlight: Option<EventId>,
    ) -> Result<(), StreamError> {
        self.send(Command::Select {
            target,
            zoom,
            highlight,
        })
        .await
    }

    /// Recentre on and highlight a stored event.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EngineStopped`] if the engine task has ended.
    pub async fn select_event(&self, id: EventId) -> Result<(), StreamError> {
        self.send(Command::SelectEvent(id)).await
    }

    /// Recentre on a roster sensor.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EngineStopped`] if the engine task has ended.
    pub async fn select_sensor(&self, mic_id: MicId) -> Result<(), StreamError> {
        self.send(Command::SelectSensor(mic_id)).await
    }

    /// Switch the window policy.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EngineStopped`] if the engine task has ended.
    pub async fn set_policy(&self, policy: WindowPolicy) -> Result<(), StreamError> {
        self.send(Command::SetPolicy(policy)).await
    }

    /// Report that the armed transition has been performed.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EngineStopped`] if the engine task has ended.
    pub async fn acknowledge_transition(&self) -> Result<(), StreamError> {
        self.send(Command::AcknowledgeTransition).await
    }

    /// Stop the engine, close its feed, and wait for everything to finish.
    pub async fn shutdown(self) {
        // Already stopped is fine; the join below still completes.
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "engine task ended abnormally");
        }
    }
}
