//! Render-facing state published by the engine.
//!
//! The renderer only ever reads these values. [`ViewState`] is owned by
//! the focus controller and [`DashboardView`] is rebuilt on every render
//! tick from the store, the window policy, and the confidence model.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ConnectionState, TransitionKind, WindowPolicy};
use crate::ids::EventId;
use crate::structs::{GunshotEvent, LatLon, Sensor};
use crate::time::Timestamp;

/// A pending camera move that the renderer must perform once.
///
/// The renderer acknowledges it after acting so unrelated re-renders do
/// not replay the animation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ViewTransition {
    /// Where to move the map.
    pub target: LatLon,
    /// Zoom level to land on.
    pub zoom: u8,
    /// Animated or instant.
    pub kind: TransitionKind,
}

/// Map focal point, zoom, and the transient highlight marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ViewState {
    /// Current map center.
    pub center: LatLon,
    /// Current zoom level.
    pub zoom: u8,
    /// Event currently drawn with the highlight ring.
    pub highlighted_event_id: Option<EventId>,
    /// When the highlight expires.
    pub pending_highlight_until: Option<Timestamp>,
    /// Armed camera move, if any.
    pub transition: Option<ViewTransition>,
}

impl ViewState {
    /// A resting view at the given center and zoom.
    pub const fn at(center: LatLon, zoom: u8) -> Self {
        Self {
            center,
            zoom,
            highlighted_event_id: None,
            pending_highlight_until: None,
            transition: None,
        }
    }
}

/// An in-window event with its derived geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RenderedEvent {
    /// The event itself.
    pub event: GunshotEvent,
    /// Radius of the confidence circle in meters.
    pub confidence_radius_m: f64,
    /// Whether the highlight ring should be drawn around this event.
    pub highlighted: bool,
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DashboardView {
    /// Sensors inside the active window.
    pub sensors: Vec<Sensor>,
    /// Events inside the active window, in arrival order.
    pub events: Vec<RenderedEvent>,
    /// Map viewport state.
    pub view: ViewState,
    /// Stream connection state, or `None` for the polling feed.
    pub connection: Option<ConnectionState>,
    /// The active window policy.
    pub policy: WindowPolicy,
    /// Radius of the highlight ring in meters.
    pub highlight_radius_m: f64,
    /// Engine clock reading the view was derived at.
    pub generated_at: Timestamp,
}

impl DashboardView {
    /// The view before any data has arrived.
    pub const fn empty(view: ViewState, policy: WindowPolicy, highlight_radius_m: f64) -> Self {
        Self {
            sensors: Vec::new(),
            events: Vec::new(),
            view,
            connection: None,
            policy,
            highlight_radius_m,
            generated_at: Timestamp::EPOCH,
        }
    }

    /// Look up a rendered event by id.
    pub fn event(&self, id: &EventId) -> Option<&RenderedEvent> {
        self.events.iter().find(|e| &e.event.id == id)
    }
}
