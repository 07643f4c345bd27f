//! Shared fixtures for the stream integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use gunshot_stream::{Connector, StreamError};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What one connection attempt does.
pub enum Session {
    /// The handshake fails.
    Refuse,
    /// The handshake succeeds, the frames are delivered, then the peer drops.
    Drop(Vec<String>),
    /// The handshake succeeds, the frames are delivered, and the connection
    /// stays open.
    Hold(Vec<String>),
    /// The handshake succeeds and frames arrive as the test sends them.
    /// Dropping the sender drops the connection.
    Live(mpsc::UnboundedReceiver<String>),
}

/// A transport that plays back a fixed list of sessions.
///
/// Once the script runs out every further attempt holds an idle, open
/// connection.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Session>>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedConnector {
    /// A connector that plays `sessions` in order.
    pub fn new(sessions: impl IntoIterator<Item = Session>) -> Self {
        Self {
            script: Arc::new(Mutex::new(sessions.into_iter().collect())),
            attempts: Arc::default(),
        }
    }

    /// When each connection attempt happened.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    type Stream = BoxStream<'static, Result<String, StreamError>>;

    async fn connect(&self) -> Result<Self::Stream, StreamError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Session::Refuse) => Err(StreamError::Handshake("scripted refusal".to_owned())),
            Some(Session::Drop(frames)) => Ok(stream::iter(frames.into_iter().map(Ok)).boxed()),
            Some(Session::Hold(frames)) => Ok(stream::iter(frames.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Some(Session::Live(frames)) => Ok(stream::unfold(frames, |mut frames| async move {
                frames.recv().await.map(|frame| (Ok(frame), frames))
            })
            .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}

/// A live session and the sender that feeds it.
pub fn live() -> (Session, mpsc::UnboundedSender<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Session::Live(rx), tx)
}

/// A canonical event JSON object.
pub fn canonical_event(id: u64, lat: f64, lon: f64, time_us: i64) -> Value {
    json!({
        "id": id,
        "estimated_location": { "lat": lat, "lon": lon, "time": time_us },
        "triggered_mics": [{ "mic_id": 1, "lat": lat, "lon": lon }]
    })
}

/// A legacy flat event JSON object.
pub fn legacy_event(id: u64, lat: f64, lon: f64, time_us: i64) -> Value {
    json!({
        "id": id,
        "lat": lat,
        "lon": lon,
        "timestamp": time_us,
        "logs": [{ "mic_id": 1, "lat": lat, "lon": lon }]
    })
}

/// A `gunshot_events` snapshot frame.
pub fn snapshot_frame(events: &[Value]) -> String {
    json!({ "gunshot_events": events }).to_string()
}

/// A `sensor_update` roster frame.
pub fn roster_frame(sensors: &[(u32, f64, f64)]) -> String {
    let sensors: Vec<Value> = sensors
        .iter()
        .map(|(id, lat, lon)| json!({ "mic_id": id, "lat": lat, "lon": lon }))
        .collect();
    json!({ "type": "sensor_update", "sensors": sensors }).to_string()
}
