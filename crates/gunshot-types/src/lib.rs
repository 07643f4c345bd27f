//! Shared type definitions for the gunshot dashboard sync engine.
//!
//! This crate is the single source of truth for the records the engine
//! stores and the view it publishes. Render-facing types flow to
//! `TypeScript` via `ts-rs` so the map front end consumes the same shapes.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes for sensors and events
//! - [`time`] -- Microsecond timestamps
//! - [`structs`] -- Canonical sensor and event records
//! - [`enums`] -- Window policy, connection state, transition kinds
//! - [`view`] -- Published view state for the renderer
//! - [`wire`] -- Inbound frame decoding and backend shape adapters

pub mod enums;
pub mod error;
pub mod ids;
pub mod structs;
pub mod time;
pub mod view;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use enums::{ConnectionState, TransitionKind, WindowPolicy};
pub use error::{DecodeError, PolicyParseError};
pub use ids::{EventId, MicId};
pub use structs::{EstimatedLocation, GunshotEvent, LatLon, MicHit, Sensor};
pub use time::Timestamp;
pub use view::{DashboardView, RenderedEvent, ViewState, ViewTransition};
pub use wire::{LegacyEvent, StreamMessage, decode_frame};
