//! Polling feed: periodic HTTP pulls of sensors and events.
//!
//! Sensors and events are pulled immediately and then on every interval
//! tick. Each pull returns the backend's full list, so every result is
//! delivered as a snapshot. The two pulls fail independently: a failed
//! pull is logged and delivered as an empty list, which empties only that
//! collection until its next successful pull. There is no retry before
//! the next tick.

use std::time::Duration;

use gunshot_core::config::{BackendConfig, DashboardConfig};
use gunshot_types::wire::{decode_sensors, normalize_events};
use gunshot_types::{GunshotEvent, Sensor, StreamMessage};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::StreamError;

/// Roster endpoint path.
pub const SENSORS_PATH: &str = "/get_sensors";

/// Event list endpoint path.
pub const EVENTS_PATH: &str = "/gunshot_events";

/// HTTP endpoints of the backend.
#[derive(Debug, Clone)]
struct Endpoints {
    client: reqwest::Client,
    sensors_url: String,
    events_url: String,
}

impl Endpoints {
    async fn get_json(&self, url: &str) -> Result<Value, StreamError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StreamError::Http(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Http(format!("GET {url} returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| StreamError::Http(format!("GET {url} body is not JSON: {e}")))
    }

    async fn sensors(&self) -> Result<Vec<Sensor>, StreamError> {
        let body = self.get_json(&self.sensors_url).await?;
        decode_sensors(body).map_err(|e| StreamError::Http(format!("bad sensor list: {e}")))
    }

    async fn events(&self) -> Result<Vec<GunshotEvent>, StreamError> {
        let body = self.get_json(&self.events_url).await?;
        normalize_events(body).map_err(|e| StreamError::Http(format!("bad event list: {e}")))
    }
}

/// Periodic puller of the backend's HTTP endpoints.
pub struct Poller {
    endpoints: Endpoints,
    interval: Duration,
    inbound_tx: Option<mpsc::Sender<StreamMessage>>,
    inbound_rx: Option<mpsc::Receiver<StreamMessage>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Create a poller against `backend`. Nothing is fetched until [`Self::start`].
    pub fn new(backend: &BackendConfig, interval: Duration, channel_capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(channel_capacity.max(1));
        Self {
            endpoints: Endpoints {
                client: reqwest::Client::new(),
                sensors_url: backend.endpoint(SENSORS_PATH),
                events_url: backend.endpoint(EVENTS_PATH),
            },
            interval: interval.max(Duration::from_millis(1)),
            inbound_tx: Some(inbound_tx),
            inbound_rx: Some(inbound_rx),
            shutdown: None,
            task: None,
        }
    }

    /// Create a poller from the `backend` and `timing` config sections.
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(
            &config.backend,
            config.timing.poll_interval(),
            config.timing.channel_capacity,
        )
    }

    /// Start pulling. Calling this again does nothing.
    pub fn start(&mut self) {
        let Some(inbound) = self.inbound_tx.take() else {
            debug!("start called on an already started poller");
            return;
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        info!(
            sensors_url = %self.endpoints.sensors_url,
            events_url = %self.endpoints.events_url,
            interval_ms = self.interval.as_millis(),
            "starting poller"
        );
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(poll(
            self.endpoints.clone(),
            self.interval,
            inbound,
            shutdown_rx,
        )));
    }

    /// Take the receiver of pulled snapshots. Later calls return `None`.
    pub fn messages(&mut self) -> Option<mpsc::Receiver<StreamMessage>> {
        self.inbound_rx.take()
    }

    /// Pull the sensor roster once.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Http`] if the request fails or the body is
    /// not a sensor list.
    pub async fn fetch_sensors(&self) -> Result<Vec<Sensor>, StreamError> {
        self.endpoints.sensors().await
    }

    /// Pull the event list once, normalizing either event layout.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Http`] if the request fails or any event is
    /// malformed.
    pub async fn fetch_events(&self) -> Result<Vec<GunshotEvent>, StreamError> {
        self.endpoints.events().await
    }

    /// Stop pulling and wait for the task to finish.
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }
        self.inbound_tx = None;
        debug!("poller closed");
    }
}

/// Poller task. Every await is raced against `shutdown` so `close()`
/// never waits on a slow backend.
async fn poll(
    endpoints: Endpoints,
    interval: Duration,
    inbound: mpsc::Sender<StreamMessage>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let pulled = tokio::select! {
            _ = &mut shutdown => break,
            pulled = endpoints.sensors() => pulled,
        };
        let sensors = pulled.unwrap_or_else(|e| {
            warn!(error = %e, "sensor pull failed; clearing roster");
            Vec::new()
        });
        debug!(count = sensors.len(), "sensors pulled");
        if !deliver(&inbound, &mut shutdown, StreamMessage::Roster(sensors)).await {
            break;
        }

        let pulled = tokio::select! {
            _ = &mut shutdown => break,
            pulled = endpoints.events() => pulled,
        };
        let events = pulled.unwrap_or_else(|e| {
            warn!(error = %e, "event pull failed; clearing events");
            Vec::new()
        });
        debug!(count = events.len(), "events pulled");
        if !deliver(&inbound, &mut shutdown, StreamMessage::Events(events)).await {
            break;
        }
    }
    debug!("poller task stopped");
}

/// Send one pulled snapshot. `false` means the poller should stop.
async fn deliver(
    inbound: &mpsc::Sender<StreamMessage>,
    shutdown: &mut oneshot::Receiver<()>,
    message: StreamMessage,
) -> bool {
    tokio::select! {
        _ = shutdown => false,
        sent = inbound.send(message) => {
            if sent.is_err() {
                warn!("inbound receiver dropped; stopping poller");
            }
            sent.is_ok()
        }
    }
}
