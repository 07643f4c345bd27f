//! Canonical sensor and gunshot event records.
//!
//! Every feed (stream snapshot, legacy flat list, HTTP pull) is normalized
//! into these shapes at the transport boundary. Nothing downstream of
//! [`crate::wire`] ever sees a backend-specific layout.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{EventId, MicId};
use crate::time::Timestamp;

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LatLon {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl LatLon {
    /// Build a coordinate pair.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// An acoustic sensor reported in the backend roster.
///
/// The roster is replaced wholesale on every update. A sensor that is
/// missing from the latest roster has been removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Sensor {
    /// Stable sensor identity.
    pub mic_id: MicId,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// When the backend registered the sensor, if known.
    #[serde(default)]
    pub registered_at: Option<Timestamp>,
}

impl Sensor {
    /// Position of the sensor.
    pub const fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// A microphone that contributed to a triangulated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MicHit {
    /// Sensor that heard the shot.
    pub mic_id: MicId,
    /// Sensor latitude at detection time.
    pub lat: f64,
    /// Sensor longitude at detection time.
    pub lon: f64,
}

/// Upstream triangulation result: where and when the shot happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EstimatedLocation {
    /// Estimated latitude in degrees.
    pub lat: f64,
    /// Estimated longitude in degrees.
    pub lon: f64,
    /// Estimated shot time. This is the ordering key for events.
    pub time: Timestamp,
}

/// A triangulated gunshot event.
///
/// Immutable once received. A later snapshot may supersede the whole
/// known-event set, but an individual event is never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GunshotEvent {
    /// Session-unique event identity.
    pub id: EventId,
    /// Triangulated position and time.
    pub estimated_location: EstimatedLocation,
    /// Sensors that heard the shot, in backend order.
    #[serde(default)]
    pub triggered_mics: Vec<MicHit>,
}

impl GunshotEvent {
    /// Estimated time of the shot.
    pub const fn time(&self) -> Timestamp {
        self.estimated_location.time
    }

    /// Estimated position of the shot.
    pub const fn position(&self) -> LatLon {
        LatLon::new(self.estimated_location.lat, self.estimated_location.lon)
    }
}
