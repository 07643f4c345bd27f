//! Event store, window filtering, and viewport control for the gunshot
//! dashboard sync engine.
//!
//! Everything in this crate is synchronous and owned by a single writer.
//! The async plumbing (connections, timers, the engine task) lives in
//! `gunshot-stream`.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `gunshot-dashboard.yaml` into
//!   strongly-typed structs.
//! - [`store`] -- [`EventStore`] with replace and append-dedup merges.
//! - [`window`] -- Pure time-window filter over sensors and events.
//! - [`focus`] -- [`FocusController`] for recentring and highlights.
//! - [`confidence`] -- Acoustic confidence radius per event.
//!
//! [`EventStore`]: store::EventStore
//! [`FocusController`]: focus::FocusController

pub mod confidence;
pub mod config;
pub mod focus;
pub mod store;
pub mod window;
