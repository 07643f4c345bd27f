//! Time-window filtering of sensors and events.
//!
//! [`apply`] is a pure function of its inputs. It never touches the
//! store, so switching policy is a matter of calling it again with a
//! different [`WindowPolicy`].
//!
//! The window is `[now - policy.duration(), now + skew]`, inclusive at
//! both ends. The forward `skew` absorbs backend clocks running slightly
//! ahead of ours. All bounds are computed once, in microseconds.

use chrono::TimeDelta;
use gunshot_types::{GunshotEvent, Sensor, Timestamp, WindowPolicy};

/// Default forward slack, in seconds, for timestamps ahead of the local clock.
pub const DEFAULT_SKEW_SECS: i64 = 60;

/// [`DEFAULT_SKEW_SECS`] as a [`TimeDelta`].
pub fn default_skew() -> TimeDelta {
    TimeDelta::seconds(DEFAULT_SKEW_SECS)
}

/// The sensors and events in scope for one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowView {
    /// Visible sensors, in roster order.
    pub sensors: Vec<Sensor>,
    /// Visible events, in arrival order.
    pub events: Vec<GunshotEvent>,
}

/// Inclusive time bounds of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Earliest visible time.
    pub start: Timestamp,
    /// Latest visible time.
    pub end: Timestamp,
}

impl Bounds {
    /// Bounds for `policy` evaluated at `now`.
    pub fn new(policy: WindowPolicy, now: Timestamp, skew: TimeDelta) -> Self {
        Self {
            start: now.saturating_sub(policy.duration()),
            end: now.saturating_add(skew),
        }
    }

    /// Whether `at` lies inside the bounds.
    pub fn contains(self, at: Timestamp) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Whether a sensor is in scope. Sensors with no registration time always are.
pub fn sensor_visible(sensor: &Sensor, bounds: Bounds) -> bool {
    sensor.registered_at.is_none_or(|at| bounds.contains(at))
}

/// Whether an event is in scope.
pub fn event_visible(event: &GunshotEvent, bounds: Bounds) -> bool {
    bounds.contains(event.time())
}

/// Select the sensors and events visible under `policy` at `now`.
pub fn apply(
    sensors: &[Sensor],
    events: &[GunshotEvent],
    policy: WindowPolicy,
    now: Timestamp,
    skew: TimeDelta,
) -> WindowView {
    let bounds = Bounds::new(policy, now, skew);
    WindowView {
        sensors: sensors
            .iter()
            .filter(|sensor| sensor_visible(sensor, bounds))
            .cloned()
            .collect(),
        events: events
            .iter()
            .filter(|event| event_visible(event, bounds))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use gunshot_types::{EstimatedLocation, EventId, MicId};

    const MINUTE: i64 = 60 * 1_000_000;
    const NOW: Timestamp = Timestamp::from_micros(1_700_000_000_000_000);

    fn ago(minutes: i64) -> Timestamp {
        Timestamp::from_micros(NOW.as_micros() - minutes * MINUTE)
    }

    fn sensor(id: u32, registered_at: Option<Timestamp>) -> Sensor {
        Sensor {
            mic_id: MicId(id),
            lat: 42.33,
            lon: -83.04,
            registered_at,
        }
    }

    fn event(id: u64, at: Timestamp) -> GunshotEvent {
        GunshotEvent {
            id: EventId::from(id),
            estimated_location: EstimatedLocation {
                lat: 42.33,
                lon: -83.04,
                time: at,
            },
            triggered_mics: Vec::new(),
        }
    }

    #[test]
    fn one_hour_window_over_sensors() {
        let sensors = vec![
            sensor(1, Some(ago(30))),
            sensor(2, Some(ago(120))),
            sensor(3, None),
        ];
        let view = apply(&sensors, &[], WindowPolicy::OneHour, NOW, default_skew());
        let visible: Vec<MicId> = view.sensors.iter().map(|s| s.mic_id).collect();
        assert_eq!(visible, vec![MicId(1), MicId(3)]);
    }

    #[test]
    fn bounds_are_inclusive() {
        let events = vec![
            event(1, ago(60)),
            event(2, Timestamp::from_micros(NOW.as_micros() + MINUTE)),
            event(3, Timestamp::from_micros(ago(60).as_micros() - 1)),
            event(4, Timestamp::from_micros(NOW.as_micros() + MINUTE + 1)),
        ];
        let view = apply(&[], &events, WindowPolicy::OneHour, NOW, default_skew());
        let ids: Vec<String> = view.events.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn policies_widen_the_window() {
        let events = vec![event(1, ago(1)), event(2, ago(30)), event(3, ago(600))];
        let count = |policy| apply(&[], &events, policy, NOW, default_skew()).events.len();
        assert_eq!(count(WindowPolicy::Rolling { seconds: 10 }), 0);
        assert_eq!(count(WindowPolicy::TwoMinutes), 1);
        assert_eq!(count(WindowPolicy::OneHour), 2);
        assert_eq!(count(WindowPolicy::TwentyFourHours), 3);
    }

    #[test]
    fn filter_is_idempotent() {
        let sensors = vec![sensor(1, Some(ago(5))), sensor(2, Some(ago(90))), sensor(3, None)];
        let events = vec![event(1, ago(1)), event(2, ago(45)), event(3, ago(180))];
        for policy in [
            WindowPolicy::TwoMinutes,
            WindowPolicy::OneHour,
            WindowPolicy::TwentyFourHours,
            WindowPolicy::Rolling { seconds: 10 },
        ] {
            let once = apply(&sensors, &events, policy, NOW, default_skew());
            let twice = apply(&once.sensors, &once.events, policy, NOW, default_skew());
            assert_eq!(once, twice, "policy {policy} not idempotent");
        }
    }

    #[test]
    fn arrival_order_is_preserved() {
        let events = vec![event(1, ago(3)), event(2, ago(10)), event(3, ago(1))];
        let view = apply(&[], &events, WindowPolicy::OneHour, NOW, default_skew());
        let ids: Vec<String> = view.events.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
