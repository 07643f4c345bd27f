//! Acoustic confidence geometry for triangulated events.
//!
//! The radius models how far sound travels during the assumed timing
//! error of the sensor network. It does not depend on the event yet;
//! the event is taken so per-event error terms can slot in without
//! changing callers.

use gunshot_types::GunshotEvent;

/// Speed of sound in air at roughly 20 C, in meters per second.
pub const SPEED_OF_SOUND_MPS: f64 = 343.0;

/// Assumed timing error of the sensor network, in seconds.
pub const ASSUMED_TIMING_ERROR_S: f64 = 0.1;

/// Radius of the highlight ring drawn around a focused event, in meters.
pub const HIGHLIGHT_RADIUS_M: f64 = 150.0;

/// Radius of the confidence circle around `event`, in meters.
pub fn confidence_radius(_event: &GunshotEvent) -> f64 {
    SPEED_OF_SOUND_MPS * ASSUMED_TIMING_ERROR_S
}
