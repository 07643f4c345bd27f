//! Configuration loading and typed config structures for the dashboard engine.
//!
//! The configuration lives in a YAML document (conventionally
//! `gunshot-dashboard.yaml`). Every field has a default matching the
//! behaviour of the deployed dashboard, so an empty mapping (`{}`) is a
//! complete configuration. A few environment variables override the
//! backend location after parsing.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use gunshot_types::{LatLon, WindowPolicy};
use serde::Deserialize;

use crate::store::MergeMode;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DashboardConfig {
    /// Where the backend lives and how events are delivered.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Timer and channel settings.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Map viewport defaults.
    #[serde(default)]
    pub view: ViewConfig,

    /// Initial window policy.
    #[serde(default)]
    pub window: WindowConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DashboardConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `GUNSHOT_BACKEND_URL` overrides `backend.base_url`
    /// - `GUNSHOT_STREAM_PATH` overrides `backend.stream_path`
    /// - `GUNSHOT_FEED` overrides `backend.feed` (`stream` or `poll`)
    /// - `GUNSHOT_EVENT_DELIVERY` overrides `backend.event_delivery`
    ///   (`snapshot` or `incremental`)
    /// - `GUNSHOT_WINDOW_POLICY` overrides `window.policy`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying process
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse_with_env(yaml, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a YAML string, reading overrides through
    /// `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// See [`DashboardConfig::parse`].
    pub fn parse_with_env<F>(yaml: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `GUNSHOT_FEED` or
    /// `GUNSHOT_EVENT_DELIVERY` names an unknown value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("GUNSHOT_BACKEND_URL") {
            self.backend.base_url = val;
        }
        if let Some(val) = lookup("GUNSHOT_STREAM_PATH") {
            self.backend.stream_path = val;
        }
        if let Some(val) = lookup("GUNSHOT_FEED") {
            self.backend.feed = val.parse()?;
        }
        if let Some(val) = lookup("GUNSHOT_EVENT_DELIVERY") {
            self.backend.event_delivery = val.parse()?;
        }
        if let Some(val) = lookup("GUNSHOT_WINDOW_POLICY") {
            self.window.policy = val;
        }
        Ok(())
    }

    /// Check that every value is usable by the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.stream_url()?;
        self.window_policy()?;

        let timers = [
            ("timing.poll_interval_ms", self.timing.poll_interval_ms),
            ("timing.reconnect_backoff_ms", self.timing.reconnect_backoff_ms),
            ("timing.highlight_ms", self.timing.highlight_ms),
            ("timing.render_interval_ms", self.timing.render_interval_ms),
            ("timing.handshake_timeout_ms", self.timing.handshake_timeout_ms),
            ("timing.keepalive_ms", self.timing.keepalive_ms),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
        }
        if self.timing.idle_timeout_ms <= self.timing.keepalive_ms {
            return Err(ConfigError::Invalid(
                "timing.idle_timeout_ms must exceed timing.keepalive_ms".to_owned(),
            ));
        }
        if self.timing.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "timing.channel_capacity must be at least 1".to_owned(),
            ));
        }
        if self.window.rolling_seconds == 0 {
            return Err(ConfigError::Invalid(
                "window.rolling_seconds must be at least 1".to_owned(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.view.default_lat)
            || !(-180.0..=180.0).contains(&self.view.default_lon)
        {
            return Err(ConfigError::Invalid(format!(
                "view default center ({}, {}) is not a valid coordinate",
                self.view.default_lat, self.view.default_lon
            )));
        }
        if self.view.default_zoom > MAX_ZOOM || self.view.focus_zoom > MAX_ZOOM {
            return Err(ConfigError::Invalid(format!(
                "zoom levels must be at most {MAX_ZOOM}"
            )));
        }
        Ok(())
    }

    /// The initial window policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `window.policy` is not a
    /// supported selector value.
    pub fn window_policy(&self) -> Result<WindowPolicy, ConfigError> {
        if self.window.policy.trim() == "rolling" {
            return Ok(WindowPolicy::Rolling {
                seconds: self.window.rolling_seconds,
            });
        }
        self.window
            .policy
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("window.policy: {e}")))
    }

    /// How inbound event batches merge into the store.
    ///
    /// Fixed for the life of the engine. Pulls always carry the backend's
    /// full list, so the polling feed replaces regardless of
    /// `backend.event_delivery`.
    pub fn merge_mode(&self) -> MergeMode {
        match self.backend.feed {
            FeedKind::Poll => MergeMode::Replace,
            FeedKind::Stream => MergeMode::for_delivery(
                self.backend.event_delivery,
                self.window.rolling_horizon(),
            ),
        }
    }
}

/// Highest zoom level slippy-map tile servers provide.
pub const MAX_ZOOM: u8 = 22;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Where events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Push feed over the streaming endpoint.
    #[default]
    Stream,
    /// Periodic HTTP pulls of sensors and events.
    Poll,
}

impl FromStr for FeedKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stream" => Ok(Self::Stream),
            "poll" => Ok(Self::Poll),
            other => Err(ConfigError::Invalid(format!("unknown feed kind: {other}"))),
        }
    }
}

/// What each event message on the stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventDelivery {
    /// Every message is the backend's complete event set.
    #[default]
    Snapshot,
    /// Messages carry only new events for a bounded live window.
    Incremental,
}

impl FromStr for EventDelivery {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "incremental" => Ok(Self::Incremental),
            other => Err(ConfigError::Invalid(format!(
                "unknown event delivery: {other}"
            ))),
        }
    }
}

/// Backend location and feed selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    /// Base HTTP URL of the backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the streaming endpoint on the backend host.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Which feed drives the engine.
    #[serde(default)]
    pub feed: FeedKind,

    /// Whether stream event messages are snapshots or increments.
    #[serde(default)]
    pub event_delivery: EventDelivery,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            feed: FeedKind::default(),
            event_delivery: EventDelivery::default(),
        }
    }
}

impl BackendConfig {
    /// Full URL of the streaming endpoint, with the scheme switched to
    /// `ws`/`wss`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the base URL has no supported scheme.
    pub fn stream_url(&self) -> Result<String, ConfigError> {
        let base = self.base_url.trim_end_matches('/');
        let host = [
            ("http://", "ws://"),
            ("https://", "wss://"),
            ("ws://", "ws://"),
            ("wss://", "wss://"),
        ]
        .iter()
        .find_map(|(from, to)| base.strip_prefix(from).map(|rest| format!("{to}{rest}")))
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "backend.base_url must start with http(s):// or ws(s)://, got {base}"
            ))
        })?;
        Ok(format!("{host}{}", normalize_path(&self.stream_path)))
    }

    /// Full HTTP URL of a pull endpoint such as `/get_sensors`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            normalize_path(path)
        )
    }
}

/// Ensure a path starts with exactly one `/`.
fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Timer intervals and channel sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// Interval between HTTP pulls for the polling feed.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Fixed delay before reconnecting after a drop or failed handshake.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// How long a selected event stays highlighted.
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: u64,

    /// Interval between view rebuilds when nothing else happens.
    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,

    /// Forward slack tolerated on timestamps ahead of the local clock.
    #[serde(default = "default_skew_tolerance_ms")]
    pub skew_tolerance_ms: u64,

    /// Capacity of the inbound message and command channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Upper bound on the streaming handshake.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Interval between keepalive pings on an open stream.
    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,

    /// Read silence after which an open stream counts as lost.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            highlight_ms: default_highlight_ms(),
            render_interval_ms: default_render_interval_ms(),
            skew_tolerance_ms: default_skew_tolerance_ms(),
            channel_capacity: default_channel_capacity(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            keepalive_ms: default_keepalive_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl TimingConfig {
    /// Poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reconnect backoff as a [`Duration`].
    pub const fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Render interval as a [`Duration`].
    pub const fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    /// Handshake timeout as a [`Duration`].
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Keepalive ping interval as a [`Duration`].
    pub const fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    /// Idle timeout as a [`Duration`].
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Highlight lifetime on the event timeline.
    pub fn highlight_duration(&self) -> TimeDelta {
        millis_delta(self.highlight_ms)
    }

    /// Clock skew tolerance on the event timeline.
    pub fn skew_tolerance(&self) -> TimeDelta {
        millis_delta(self.skew_tolerance_ms)
    }
}

/// Convert configured milliseconds to a [`TimeDelta`], clamping huge values.
fn millis_delta(ms: u64) -> TimeDelta {
    i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .unwrap_or(TimeDelta::MAX)
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Map viewport defaults and focus behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViewConfig {
    /// Latitude of the initial map center.
    #[serde(default = "default_lat")]
    pub default_lat: f64,

    /// Longitude of the initial map center.
    #[serde(default = "default_lon")]
    pub default_lon: f64,

    /// Initial zoom level.
    #[serde(default = "default_zoom")]
    pub default_zoom: u8,

    /// Close-in zoom used when focusing an event or sensor.
    #[serde(default = "default_focus_zoom")]
    pub focus_zoom: u8,

    /// Length of the animated fly transition.
    #[serde(default = "default_fly_duration_ms")]
    pub fly_duration_ms: u32,

    /// Whether user selections fly (`true`) or snap (`false`).
    #[serde(default = "default_true")]
    pub animate_manual: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            default_lat: default_lat(),
            default_lon: default_lon(),
            default_zoom: default_zoom(),
            focus_zoom: default_focus_zoom(),
            fly_duration_ms: default_fly_duration_ms(),
            animate_manual: true,
        }
    }
}

impl ViewConfig {
    /// Initial map center.
    pub const fn default_center(&self) -> LatLon {
        LatLon::new(self.default_lat, self.default_lon)
    }
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// Initial window policy selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WindowConfig {
    /// Selector value: `2m`, `1h`, `24h`, `<n>s`, or `rolling`.
    #[serde(default = "default_policy")]
    pub policy: String,

    /// Width of the window selected by `rolling`.
    #[serde(default = "default_rolling_seconds")]
    pub rolling_seconds: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            rolling_seconds: default_rolling_seconds(),
        }
    }
}

impl WindowConfig {
    /// Horizon of the rolling live window.
    pub fn rolling_horizon(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.rolling_seconds))
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_owned()
}

fn default_stream_path() -> String {
    "/ws".to_owned()
}

const fn default_poll_interval_ms() -> u64 {
    10_000
}

const fn default_reconnect_backoff_ms() -> u64 {
    5_000
}

const fn default_highlight_ms() -> u64 {
    3_000
}

const fn default_render_interval_ms() -> u64 {
    1_000
}

const fn default_skew_tolerance_ms() -> u64 {
    60_000
}

const fn default_channel_capacity() -> usize {
    256
}

const fn default_handshake_timeout_ms() -> u64 {
    10_000
}

const fn default_keepalive_ms() -> u64 {
    15_000
}

const fn default_idle_timeout_ms() -> u64 {
    45_000
}

const fn default_lat() -> f64 {
    42.3351
}

const fn default_lon() -> f64 {
    -83.0469
}

const fn default_zoom() -> u8 {
    15
}

const fn default_focus_zoom() -> u8 {
    18
}

const fn default_fly_duration_ms() -> u32 {
    1_500
}

fn default_policy() -> String {
    "1h".to_owned()
}

const fn default_rolling_seconds() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_valid() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.timing.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.timing.highlight_duration(), TimeDelta::seconds(3));
        assert_eq!(config.timing.skew_tolerance(), TimeDelta::seconds(60));
        assert_eq!(config.view.focus_zoom, 18);
        assert_eq!(config.view.default_zoom, 15);
        assert_eq!(config.window_policy().ok(), Some(WindowPolicy::OneHour));
        assert_eq!(config.timing.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.backend.event_delivery, EventDelivery::Snapshot);
        assert_eq!(config.merge_mode(), MergeMode::Replace);
    }

    #[test]
    fn empty_mapping_uses_defaults() {
        let config = DashboardConfig::parse_with_env("{}", no_env).ok();
        assert_eq!(config, Some(DashboardConfig::default()));
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
backend:
  base_url: "https://sensors.example.org/"
  stream_path: "live"
  feed: poll
  event_delivery: incremental
timing:
  poll_interval_ms: 2000
  reconnect_backoff_ms: 1000
  highlight_ms: 500
  render_interval_ms: 250
  skew_tolerance_ms: 30000
  channel_capacity: 16
  handshake_timeout_ms: 3000
  keepalive_ms: 5000
  idle_timeout_ms: 12000
view:
  default_lat: 40.0
  default_lon: -75.0
  default_zoom: 12
  focus_zoom: 17
  fly_duration_ms: 800
  animate_manual: false
window:
  policy: rolling
  rolling_seconds: 30
logging:
  level: debug
  json: true
"#;
        let config = DashboardConfig::parse_with_env(yaml, no_env);
        assert!(config.is_ok());
        let config = config.unwrap_or_default();
        assert_eq!(config.backend.feed, FeedKind::Poll);
        assert_eq!(
            config.backend.stream_url().ok().as_deref(),
            Some("wss://sensors.example.org/live")
        );
        assert_eq!(
            config.backend.endpoint("get_sensors"),
            "https://sensors.example.org/get_sensors"
        );
        assert_eq!(config.timing.channel_capacity, 16);
        assert_eq!(config.timing.keepalive(), Duration::from_secs(5));
        assert_eq!(config.timing.idle_timeout(), Duration::from_secs(12));
        assert_eq!(config.backend.event_delivery, EventDelivery::Incremental);
        // Pulls replace whatever the stream delivery says.
        assert_eq!(config.merge_mode(), MergeMode::Replace);
        assert_eq!(config.view.focus_zoom, 17);
        assert!(!config.view.animate_manual);
        assert_eq!(
            config.window_policy().ok(),
            Some(WindowPolicy::Rolling { seconds: 30 })
        );
        assert_eq!(config.window.rolling_horizon(), TimeDelta::seconds(30));
        assert!(config.logging.json);
    }

    #[test]
    fn stream_url_switches_scheme() {
        let backend = BackendConfig::default();
        assert_eq!(backend.stream_url().ok().as_deref(), Some("ws://127.0.0.1:8000/ws"));
        assert_eq!(
            backend.endpoint("/gunshot_events"),
            "http://127.0.0.1:8000/gunshot_events"
        );
    }

    #[test]
    fn env_overrides_apply_after_yaml() {
        let env = |name: &str| match name {
            "GUNSHOT_BACKEND_URL" => Some("http://10.0.0.5:9000".to_owned()),
            "GUNSHOT_FEED" => Some("poll".to_owned()),
            "GUNSHOT_WINDOW_POLICY" => Some("24h".to_owned()),
            _ => None,
        };
        let yaml = "backend:\n  base_url: \"http://ignored:1\"\n";
        let config = DashboardConfig::parse_with_env(yaml, env).unwrap_or_default();
        assert_eq!(config.backend.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.backend.feed, FeedKind::Poll);
        assert_eq!(config.window_policy().ok(), Some(WindowPolicy::TwentyFourHours));
    }

    #[test]
    fn bad_feed_override_is_rejected() {
        let env = |name: &str| (name == "GUNSHOT_FEED").then(|| "carrier-pigeon".to_owned());
        let result = DashboardConfig::parse_with_env("{}", env);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let env = |name: &str| (name == "GUNSHOT_EVENT_DELIVERY").then(|| "trickle".to_owned());
        let result = DashboardConfig::parse_with_env("{}", env);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            "backend:\n  base_url: \"ftp://nope\"\n",
            "window:\n  policy: \"1w\"\n",
            "timing:\n  reconnect_backoff_ms: 0\n",
            "timing:\n  channel_capacity: 0\n",
            "view:\n  default_lat: 91.0\n",
            "view:\n  focus_zoom: 30\n",
            "window:\n  policy: rolling\n  rolling_seconds: 0\n",
            "timing:\n  keepalive_ms: 5000\n  idle_timeout_ms: 5000\n",
            "timing:\n  handshake_timeout_ms: 0\n",
        ];
        for yaml in cases {
            let result = DashboardConfig::parse_with_env(yaml, no_env);
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "expected invalid config for {yaml:?}"
            );
        }
    }

    #[test]
    fn merge_mode_is_fixed_by_delivery_not_window_policy() {
        let incremental = |name: &str| match name {
            "GUNSHOT_EVENT_DELIVERY" => Some("incremental".to_owned()),
            "GUNSHOT_WINDOW_POLICY" => Some("1h".to_owned()),
            _ => None,
        };
        let config = DashboardConfig::parse_with_env("window:\n  rolling_seconds: 20\n", incremental)
            .unwrap_or_default();
        assert_eq!(config.window_policy().ok(), Some(WindowPolicy::OneHour));
        assert_eq!(
            config.merge_mode(),
            MergeMode::AppendDedup {
                horizon: TimeDelta::seconds(20)
            }
        );

        let snapshot = DashboardConfig::parse_with_env("window:\n  policy: rolling\n", no_env)
            .unwrap_or_default();
        assert_eq!(snapshot.merge_mode(), MergeMode::Replace);
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        let result = DashboardConfig::parse_with_env("backend: [unclosed", no_env);
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = DashboardConfig::from_file(Path::new("/nonexistent/gunshot-dashboard.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
