//! Microsecond timestamps shared by sensors, events, and view state.
//!
//! The backend stamps everything in microseconds since the Unix epoch.
//! [`Timestamp`] keeps that unit end to end so window comparisons never
//! mix microseconds with milliseconds. Conversion to and from
//! [`chrono`] happens only at the edges (wall clock reads, display).

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A point in time, in microseconds since the Unix epoch.
///
/// Serialized as a bare JSON integer, matching the backend wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Timestamp(#[ts(type = "number")] pub i64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Self = Self(0);

    /// Build a timestamp from raw microseconds.
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Return the raw microsecond value.
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Read the current wall clock.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert a [`DateTime<Utc>`] to a microsecond timestamp.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_micros())
    }

    /// Convert back to a [`DateTime<Utc>`].
    ///
    /// Returns `None` if the value is outside chrono's representable range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.0)
    }

    /// Add a duration, clamping at the representable bounds.
    #[must_use]
    pub fn saturating_add(self, delta: TimeDelta) -> Self {
        Self(self.0.saturating_add(delta_micros(delta)))
    }

    /// Subtract a duration, clamping at the representable bounds.
    #[must_use]
    pub fn saturating_sub(self, delta: TimeDelta) -> Self {
        Self(self.0.saturating_sub(delta_micros(delta)))
    }

    /// Signed distance from `earlier` to `self`.
    pub fn since(self, earlier: Self) -> TimeDelta {
        TimeDelta::microseconds(self.0.saturating_sub(earlier.0))
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.to_datetime() {
            Some(at) => write!(f, "{}", at.to_rfc3339()),
            None => write!(f, "{}us", self.0),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self::from_datetime(at)
    }
}

/// Whole microseconds in a [`TimeDelta`], saturating on overflow.
fn delta_micros(delta: TimeDelta) -> i64 {
    delta.num_microseconds().unwrap_or(if delta < TimeDelta::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}
