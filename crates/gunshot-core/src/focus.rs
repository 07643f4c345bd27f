//! Map viewport control and the transient highlight marker.
//!
//! The [`FocusController`] owns the [`ViewState`]. It moves the viewport in
//! two situations:
//!
//! - **manual selection**: the user picked an event or sensor from a table.
//!   The view flies to the target and, for events, the highlight ring is
//!   shown for a fixed duration.
//! - **newest event**: the store gained an event strictly later than any
//!   the controller has reacted to. The view flies to it at focus zoom.
//!
//! Every move arms a [`ViewTransition`] that the renderer consumes once
//! via [`FocusController::take_transition`].

use chrono::TimeDelta;
use gunshot_types::{
    EventId, GunshotEvent, LatLon, Timestamp, TransitionKind, ViewState, ViewTransition,
};
use tracing::{debug, info};

use crate::config::DashboardConfig;

/// Tunables for viewport moves and highlight lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusSettings {
    /// Zoom used when recentring on a newly arrived event.
    pub focus_zoom: u8,
    /// How long a selected event stays highlighted.
    pub highlight_duration: TimeDelta,
    /// Length of the animated fly transition.
    pub fly_duration_ms: u32,
    /// Whether manual selections fly or snap.
    pub animate_manual: bool,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self::from_config(&DashboardConfig::default())
    }
}

impl FocusSettings {
    /// Build settings from the `view` and `timing` config sections.
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            focus_zoom: config.view.focus_zoom,
            highlight_duration: config.timing.highlight_duration(),
            fly_duration_ms: config.view.fly_duration_ms,
            animate_manual: config.view.animate_manual,
        }
    }

    const fn fly(&self) -> TransitionKind {
        TransitionKind::Fly {
            duration_ms: self.fly_duration_ms,
        }
    }
}

/// Owner of the viewport and highlight state.
#[derive(Debug, Clone)]
pub struct FocusController {
    view: ViewState,
    settings: FocusSettings,
    /// Latest event time the controller has recentred on.
    last_reacted: Option<Timestamp>,
}

impl FocusController {
    /// Create a controller resting at `initial`.
    pub const fn new(initial: ViewState, settings: FocusSettings) -> Self {
        Self {
            view: initial,
            settings,
            last_reacted: None,
        }
    }

    /// Current view state.
    pub const fn view(&self) -> &ViewState {
        &self.view
    }

    /// Active settings.
    pub const fn settings(&self) -> &FocusSettings {
        &self.settings
    }

    /// Move the view to a user-selected target.
    ///
    /// With `highlight` set, that event is highlighted until
    /// `now + highlight_duration`; selecting again restarts the expiry.
    /// Without it, any existing highlight is cleared.
    pub fn on_manual_select(
        &mut self,
        target: LatLon,
        zoom: u8,
        highlight: Option<EventId>,
        now: Timestamp,
    ) {
        let kind = if self.settings.animate_manual {
            self.settings.fly()
        } else {
            TransitionKind::Snap
        };
        self.move_to(target, zoom, kind);

        self.view.pending_highlight_until = highlight
            .as_ref()
            .map(|_| now.saturating_add(self.settings.highlight_duration));
        self.view.highlighted_event_id = highlight;

        debug!(
            lat = target.lat,
            lon = target.lon,
            zoom,
            highlighted = ?self.view.highlighted_event_id,
            "manual selection"
        );
    }

    /// Recentre on `event` if it is strictly newer than anything seen before.
    ///
    /// Returns whether the view moved.
    pub fn on_newest_event(&mut self, event: &GunshotEvent) -> bool {
        let time = event.time();
        if self.last_reacted.is_some_and(|mark| time <= mark) {
            return false;
        }
        self.last_reacted = Some(time);
        let kind = self.settings.fly();
        self.move_to(event.position(), self.settings.focus_zoom, kind);
        info!(event_id = %event.id, time = %time, "recentred on newest event");
        true
    }

    /// Clear the highlight once its deadline has passed.
    ///
    /// Returns whether a highlight was cleared.
    pub fn expire_highlight(&mut self, now: Timestamp) -> bool {
        match self.view.pending_highlight_until {
            Some(until) if now >= until => {
                debug!(event_id = ?self.view.highlighted_event_id, "highlight expired");
                self.view.highlighted_event_id = None;
                self.view.pending_highlight_until = None;
                true
            }
            _ => false,
        }
    }

    /// When the current highlight expires, if one is showing.
    pub const fn highlight_deadline(&self) -> Option<Timestamp> {
        self.view.pending_highlight_until
    }

    /// Hand the armed transition to the renderer, disarming it.
    pub fn take_transition(&mut self) -> Option<ViewTransition> {
        self.view.transition.take()
    }

    fn move_to(&mut self, target: LatLon, zoom: u8, kind: TransitionKind) {
        self.view.center = target;
        self.view.zoom = zoom;
        self.view.transition = Some(ViewTransition { target, zoom, kind });
    }
}
