//! Async plumbing for the gunshot dashboard sync engine.
//!
//! This crate connects the synchronous core to the outside world: it
//! keeps a streaming connection alive (or polls over HTTP), feeds decoded
//! messages into a single engine task, and publishes the derived
//! [`DashboardView`] for a renderer.
//!
//! # Modules
//!
//! - [`connection`] -- [`ConnectionManager`], the reconnect state machine,
//!   and the WebSocket [`Connector`].
//! - [`poller`] -- Periodic HTTP pulls of sensors and events.
//! - [`engine`] -- The engine task and the [`EngineHandle`] used to drive it.
//! - [`clock`] -- Wall-clock timestamps advanced by the tokio timer.
//! - [`telemetry`] -- `tracing` subscriber setup.
//! - [`error`] -- [`StreamError`].
//!
//! [`DashboardView`]: gunshot_types::DashboardView
//! [`ConnectionManager`]: connection::ConnectionManager
//! [`Connector`]: connection::Connector
//! [`EngineHandle`]: engine::EngineHandle
//! [`StreamError`]: error::StreamError

pub mod clock;
pub mod connection;
pub mod engine;
pub mod error;
pub mod poller;
pub mod telemetry;

pub use connection::{ConnectionManager, ConnectionSettings, Connector, WsConnector};
pub use engine::{Command, Engine, EngineHandle, EngineSettings, Feed};
pub use error::StreamError;
pub use poller::Poller;
