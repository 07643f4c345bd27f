//! Inbound message framing and backend shape adapters.
//!
//! The backend has shipped two event layouts over time:
//!
//! - **canonical**: `{ id, estimated_location: { lat, lon, time }, triggered_mics }`
//! - **legacy flat**: `{ id, lat, lon, timestamp, logs: [{ mic_id, lat, lon }] }`
//!
//! Each layout has one adapter. The adapter is chosen by a single
//! structural discriminator, the presence of `estimated_location`. After
//! this module every consumer sees only [`GunshotEvent`].
//!
//! Stream frames are one of:
//!
//! - `{ "type": "sensor_update", "sensors": [...] }` -> [`StreamMessage::Roster`]
//! - `{ "gunshot_events": [...] }` -> [`StreamMessage::Events`]
//! - a bare array of events (either layout) -> [`StreamMessage::Events`]

use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::ids::EventId;
use crate::structs::{EstimatedLocation, GunshotEvent, MicHit, Sensor};
use crate::time::Timestamp;

/// `type` tag of a roster update frame.
pub const SENSOR_UPDATE: &str = "sensor_update";

/// Key carrying the event list in a snapshot frame.
pub const GUNSHOT_EVENTS: &str = "gunshot_events";

/// Key whose presence marks the canonical event layout.
const CANONICAL_MARKER: &str = "estimated_location";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// The full sensor roster, replacing the previous one.
    Roster(Vec<Sensor>),
    /// An event batch. Whether it replaces or extends the store is the
    /// store's merge mode, not the message's.
    Events(Vec<GunshotEvent>),
}

impl StreamMessage {
    /// Short label for log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Roster(_) => "roster",
            Self::Events(_) => "events",
        }
    }

    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Roster(sensors) => sensors.len(),
            Self::Events(events) => events.len(),
        }
    }

    /// Whether the message carries no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Legacy flat event layout served by older backends and `GET /gunshot_events`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyEvent {
    /// Event identity.
    pub id: EventId,
    /// Estimated latitude.
    pub lat: f64,
    /// Estimated longitude.
    pub lon: f64,
    /// Estimated shot time in microseconds.
    pub timestamp: Timestamp,
    /// Sensors that heard the shot.
    #[serde(default)]
    pub logs: Vec<MicHit>,
}

impl From<LegacyEvent> for GunshotEvent {
    fn from(legacy: LegacyEvent) -> Self {
        Self {
            id: legacy.id,
            estimated_location: EstimatedLocation {
                lat: legacy.lat,
                lon: legacy.lon,
                time: legacy.timestamp,
            },
            triggered_mics: legacy.logs,
        }
    }
}

/// Decode one text frame from the stream.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the frame is not JSON, matches no known
/// shape, or any record inside it fails to normalize. A batch is
/// all-or-nothing: one bad event rejects the whole frame.
pub fn decode_frame(text: &str) -> Result<StreamMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(value)
}

/// Decode an already-parsed frame.
///
/// # Errors
///
/// See [`decode_frame`].
pub fn decode_value(value: Value) -> Result<StreamMessage, DecodeError> {
    match value {
        Value::Array(_) => normalize_events(value).map(StreamMessage::Events),
        Value::Object(mut fields) => {
            if let Some(events) = fields.remove(GUNSHOT_EVENTS) {
                return normalize_events(events).map(StreamMessage::Events);
            }
            let tag = match fields.get("type") {
                None => None,
                Some(Value::String(tag)) => Some(tag.clone()),
                Some(_) => return Err(DecodeError::UnrecognizedShape("non-string `type` tag")),
            };
            match tag.as_deref() {
                Some(SENSOR_UPDATE) => {
                    let sensors = fields
                        .remove("sensors")
                        .ok_or(DecodeError::MissingField("sensors"))?;
                    decode_sensors(sensors).map(StreamMessage::Roster)
                }
                Some(other) => Err(DecodeError::UnknownType(other.to_owned())),
                None => Err(DecodeError::UnrecognizedShape("object without a known key")),
            }
        }
        _ => Err(DecodeError::UnrecognizedShape("neither an object nor an array")),
    }
}

/// Decode a sensor list.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] if the value is not a list of sensors.
pub fn decode_sensors(value: Value) -> Result<Vec<Sensor>, DecodeError> {
    Ok(serde_json::from_value(value)?)
}

/// Normalize a list of events in either layout.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the value is not an array or any element
/// fails to normalize.
pub fn normalize_events(value: Value) -> Result<Vec<GunshotEvent>, DecodeError> {
    let Value::Array(items) = value else {
        return Err(DecodeError::UnrecognizedShape("event list is not an array"));
    };
    items.into_iter().map(normalize_event).collect()
}

/// Normalize a single event, picking the adapter by layout.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] if the value does not fit the selected layout.
pub fn normalize_event(value: Value) -> Result<GunshotEvent, DecodeError> {
    if value.get(CANONICAL_MARKER).is_some() {
        from_canonical(value)
    } else {
        from_legacy(value)
    }
}

/// Adapter for the nested `estimated_location` / `triggered_mics` layout.
fn from_canonical(value: Value) -> Result<GunshotEvent, DecodeError> {
    Ok(serde_json::from_value(value)?)
}

/// Adapter for the flat `lat` / `lon` / `timestamp` / `logs` layout.
fn from_legacy(value: Value) -> Result<GunshotEvent, DecodeError> {
    let legacy: LegacyEvent = serde_json::from_value(value)?;
    Ok(legacy.into())
}
