//! The authoritative sensor roster and gunshot event collection.
//!
//! The store is owned by exactly one writer (the engine task) and is
//! mutated only through [`EventStore::merge_roster`],
//! [`EventStore::merge_events`], and [`EventStore::clear`]. Readers get
//! slices in arrival order; window filtering happens downstream.

use std::collections::HashSet;

use chrono::TimeDelta;
use gunshot_types::{EventId, GunshotEvent, Sensor, Timestamp};
use tracing::debug;

use crate::config::EventDelivery;

/// How an inbound event batch combines with the stored set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// The batch is the entire known event set. Duplicate ids inside one
    /// batch keep their first occurrence.
    Replace,
    /// The batch extends a bounded live window. An event is kept only if
    /// its time is strictly after everything seen so far, and events older
    /// than `now - horizon` are pruned after each batch.
    AppendDedup {
        /// How far back stored events are retained.
        horizon: TimeDelta,
    },
}

impl MergeMode {
    /// The merge contract for a feed's delivery style.
    ///
    /// Chosen once per feed. Switching the window policy never changes it.
    pub const fn for_delivery(delivery: EventDelivery, horizon: TimeDelta) -> Self {
        match delivery {
            EventDelivery::Snapshot => Self::Replace,
            EventDelivery::Incremental => Self::AppendDedup { horizon },
        }
    }
}

/// Counts describing what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Events added to the store.
    pub inserted: usize,
    /// Events rejected as duplicates under the active rule.
    pub dropped_duplicates: usize,
    /// Stored events removed by the horizon prune.
    pub pruned: usize,
}

/// Deduplicated, arrival-ordered event set plus the current roster.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    sensors: Vec<Sensor>,
    events: Vec<GunshotEvent>,
    /// Latest event time accepted so far.
    high_water_mark: Option<Timestamp>,
}

impl EventStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sensor roster in full.
    pub fn merge_roster(&mut self, sensors: Vec<Sensor>) {
        debug!(count = sensors.len(), "roster replaced");
        self.sensors = sensors;
    }

    /// Merge an event batch under `mode`.
    ///
    /// `now` is only consulted by [`MergeMode::AppendDedup`] to prune
    /// events that fell out of the horizon.
    pub fn merge_events(
        &mut self,
        batch: Vec<GunshotEvent>,
        mode: MergeMode,
        now: Timestamp,
    ) -> MergeOutcome {
        let outcome = match mode {
            MergeMode::Replace => self.replace(batch),
            MergeMode::AppendDedup { horizon } => self.append(batch, horizon, now),
        };
        debug!(
            inserted = outcome.inserted,
            dropped_duplicates = outcome.dropped_duplicates,
            pruned = outcome.pruned,
            stored = self.events.len(),
            "event batch merged"
        );
        outcome
    }

    fn replace(&mut self, batch: Vec<GunshotEvent>) -> MergeOutcome {
        let mut seen: HashSet<EventId> = HashSet::with_capacity(batch.len());
        let mut outcome = MergeOutcome::default();
        let previous = self.events.len();

        self.events = batch
            .into_iter()
            .filter(|event| {
                let fresh = seen.insert(event.id.clone());
                if !fresh {
                    outcome.dropped_duplicates = outcome.dropped_duplicates.saturating_add(1);
                }
                fresh
            })
            .collect();
        self.high_water_mark = self.events.iter().map(GunshotEvent::time).max();

        outcome.inserted = self.events.len();
        outcome.pruned = previous;
        outcome
    }

    fn append(
        &mut self,
        batch: Vec<GunshotEvent>,
        horizon: TimeDelta,
        now: Timestamp,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for event in batch {
            let time = event.time();
            if self.high_water_mark.is_none_or(|mark| time > mark) {
                self.high_water_mark = Some(time);
                self.events.push(event);
                outcome.inserted = outcome.inserted.saturating_add(1);
            } else {
                outcome.dropped_duplicates = outcome.dropped_duplicates.saturating_add(1);
            }
        }

        let cutoff = now.saturating_sub(horizon);
        let before = self.events.len();
        self.events.retain(|event| event.time() >= cutoff);
        outcome.pruned = before.saturating_sub(self.events.len());
        outcome
    }

    /// The chronologically latest stored event.
    pub fn latest(&self) -> Option<&GunshotEvent> {
        self.events.iter().max_by_key(|event| event.time())
    }

    /// Look up a stored event by id.
    pub fn event(&self, id: &EventId) -> Option<&GunshotEvent> {
        self.events.iter().find(|event| &event.id == id)
    }

    /// The current roster.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Stored events in arrival order.
    pub fn events(&self) -> &[GunshotEvent] {
        &self.events
    }

    /// Latest event time accepted so far.
    pub const fn high_water_mark(&self) -> Option<Timestamp> {
        self.high_water_mark
    }

    /// Drop all events, leaving the roster alone.
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.high_water_mark = None;
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.sensors.clear();
        self.clear_events();
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use gunshot_types::{EstimatedLocation, MicId};

    fn event(id: u64, secs: i64) -> GunshotEvent {
        GunshotEvent {
            id: EventId::from(id),
            estimated_location: EstimatedLocation {
                lat: 42.0,
                lon: -83.0,
                time: Timestamp::from_micros(secs * 1_000_000),
            },
            triggered_mics: Vec::new(),
        }
    }

    fn ids(store: &EventStore) -> Vec<String> {
        store.events().iter().map(|e| e.id.to_string()).collect()
    }

    fn rolling(seconds: i64) -> MergeMode {
        MergeMode::AppendDedup {
            horizon: TimeDelta::seconds(seconds),
        }
    }

    #[test]
    fn replace_swaps_the_whole_set() {
        let mut store = EventStore::new();
        let now = Timestamp::from_micros(0);
        store.merge_events(vec![event(1, 10), event(2, 20)], MergeMode::Replace, now);
        let outcome = store.merge_events(vec![event(3, 5)], MergeMode::Replace, now);

        assert_eq!(ids(&store), vec!["3"]);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.pruned, 2);
        assert_eq!(store.high_water_mark(), Some(Timestamp::from_micros(5_000_000)));
    }

    #[test]
    fn replace_keeps_first_of_duplicate_ids() {
        let mut store = EventStore::new();
        let outcome = store.merge_events(
            vec![event(1, 10), event(2, 20), event(1, 30)],
            MergeMode::Replace,
            Timestamp::EPOCH,
        );
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(outcome.dropped_duplicates, 1);
        assert_eq!(
            store.event(&EventId::from(1)).map(GunshotEvent::time),
            Some(Timestamp::from_micros(10_000_000))
        );
    }

    #[test]
    fn replace_with_empty_batch_empties_the_store() {
        let mut store = EventStore::new();
        store.merge_events(vec![event(1, 10)], MergeMode::Replace, Timestamp::EPOCH);
        store.merge_events(Vec::new(), MergeMode::Replace, Timestamp::EPOCH);
        assert!(store.events().is_empty());
        assert!(store.latest().is_none());
        assert!(store.high_water_mark().is_none());
    }

    #[test]
    fn append_rejects_events_not_after_the_high_water_mark() {
        let mut store = EventStore::new();
        let now = Timestamp::from_micros(100_000_000);
        store.merge_events(vec![event(1, 95), event(2, 97)], rolling(10), now);
        let outcome = store.merge_events(
            vec![event(3, 97), event(4, 96), event(5, 98)],
            rolling(10),
            now,
        );

        assert_eq!(ids(&store), vec!["1", "2", "5"]);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.dropped_duplicates, 2);
    }

    #[test]
    fn append_considers_batch_in_arrival_order() {
        let mut store = EventStore::new();
        let now = Timestamp::from_micros(100_000_000);
        // 93 arrives after 99 and is rejected even though the store was empty.
        store.merge_events(vec![event(1, 99), event(2, 93)], rolling(10), now);
        assert_eq!(ids(&store), vec!["1"]);
    }

    #[test]
    fn append_prunes_outside_the_horizon() {
        let mut store = EventStore::new();
        store.merge_events(
            vec![event(1, 80), event(2, 91), event(3, 95)],
            rolling(10),
            Timestamp::from_micros(95_000_000),
        );
        assert_eq!(ids(&store), vec!["2", "3"]);

        let outcome = store.merge_events(
            vec![event(4, 104)],
            rolling(10),
            Timestamp::from_micros(104_000_000),
        );
        assert_eq!(ids(&store), vec!["3", "4"]);
        assert_eq!(outcome.pruned, 1);
    }

    #[test]
    fn no_two_stored_events_share_a_time_under_append() {
        let mut store = EventStore::new();
        let now = Timestamp::from_micros(1_000_000_000);
        for batch in [
            vec![event(1, 990), event(2, 990), event(3, 991)],
            vec![event(4, 991), event(5, 992), event(6, 992)],
        ] {
            store.merge_events(batch, rolling(60), now);
        }
        let times: HashSet<Timestamp> = store.events().iter().map(GunshotEvent::time).collect();
        assert_eq!(times.len(), store.events().len());
    }

    #[test]
    fn latest_is_chronological_not_arrival() {
        let mut store = EventStore::new();
        store.merge_events(
            vec![event(1, 30), event(2, 10), event(3, 20)],
            MergeMode::Replace,
            Timestamp::EPOCH,
        );
        assert_eq!(store.latest().map(|e| e.id.to_string()), Some("1".to_owned()));
    }

    #[test]
    fn roster_replaces_and_clear_resets() {
        let mut store = EventStore::new();
        let sensor = |id| Sensor {
            mic_id: MicId(id),
            lat: 0.0,
            lon: 0.0,
            registered_at: None,
        };
        store.merge_roster(vec![sensor(1), sensor(2)]);
        store.merge_roster(vec![sensor(3)]);
        assert_eq!(store.sensors().len(), 1);

        store.merge_events(vec![event(1, 1)], MergeMode::Replace, Timestamp::EPOCH);
        store.clear_events();
        assert!(store.events().is_empty());
        assert_eq!(store.sensors().len(), 1);

        store.clear();
        assert!(store.sensors().is_empty());
    }

    #[test]
    fn merge_mode_follows_delivery() {
        let horizon = TimeDelta::seconds(10);
        assert_eq!(
            MergeMode::for_delivery(EventDelivery::Snapshot, horizon),
            MergeMode::Replace
        );
        assert_eq!(
            MergeMode::for_delivery(EventDelivery::Incremental, horizon),
            rolling(10)
        );
    }
}
