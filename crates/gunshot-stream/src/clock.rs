//! Engine clock: wall-clock timestamps derived from a monotonic source.
//!
//! The engine reads the wall clock once at start and advances it with
//! [`tokio::time::Instant`]. Window bounds and highlight deadlines then
//! move with the tokio timer, so a paused test runtime controls both.

use chrono::TimeDelta;
use gunshot_types::Timestamp;
use tokio::time::Instant;

/// Maps tokio instants to event-timeline timestamps.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall: Timestamp,
    anchor: Instant,
}

impl MonotonicClock {
    /// Anchor the clock at the current wall time.
    pub fn start() -> Self {
        Self::anchored(Timestamp::now(), Instant::now())
    }

    /// Anchor the clock at an explicit pair of readings.
    pub const fn anchored(anchor_wall: Timestamp, anchor: Instant) -> Self {
        Self {
            anchor_wall,
            anchor,
        }
    }

    /// Current time on the event timeline.
    pub fn now(&self) -> Timestamp {
        self.timestamp_at(Instant::now())
    }

    /// Timestamp corresponding to `at`.
    pub fn timestamp_at(&self, at: Instant) -> Timestamp {
        let elapsed = at.saturating_duration_since(self.anchor);
        let elapsed = TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::MAX);
        self.anchor_wall.saturating_add(elapsed)
    }

    /// Instant at which the timeline reaches `ts`.
    ///
    /// Times before the anchor map to the anchor itself.
    pub fn instant_at(&self, ts: Timestamp) -> Instant {
        let ahead = ts.since(self.anchor_wall).to_std().unwrap_or_default();
        self.anchor.checked_add(ahead).unwrap_or(self.anchor)
    }
}
