//! Enumerations shared between the engine and the renderer.

use core::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::PolicyParseError;

// ---------------------------------------------------------------------------
// Window policy
// ---------------------------------------------------------------------------

/// The rule selecting which time range of sensors and events is in scope.
///
/// Exactly one policy is active at a time. Switching policy only changes
/// the derived view; stored data is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// The last two minutes (the "custom time" option of the selector).
    TwoMinutes,
    /// The last hour.
    #[default]
    OneHour,
    /// The last twenty-four hours.
    TwentyFourHours,
    /// A short rolling window for the live feed.
    Rolling {
        /// Width of the window in seconds.
        seconds: u32,
    },
}

impl WindowPolicy {
    /// Width of the window.
    pub fn duration(self) -> TimeDelta {
        match self {
            Self::TwoMinutes => TimeDelta::minutes(2),
            Self::OneHour => TimeDelta::hours(1),
            Self::TwentyFourHours => TimeDelta::hours(24),
            Self::Rolling { seconds } => TimeDelta::seconds(i64::from(seconds)),
        }
    }
}

impl core::fmt::Display for WindowPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TwoMinutes => f.write_str("2m"),
            Self::OneHour => f.write_str("1h"),
            Self::TwentyFourHours => f.write_str("24h"),
            Self::Rolling { seconds } => write!(f, "{seconds}s"),
        }
    }
}

impl FromStr for WindowPolicy {
    type Err = PolicyParseError;

    /// Parse the selector values `2m`, `1h`, `24h`, or `<n>s` for a
    /// rolling window of `n` seconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2m" => Ok(Self::TwoMinutes),
            "1h" => Ok(Self::OneHour),
            "24h" => Ok(Self::TwentyFourHours),
            other => {
                let seconds = other
                    .strip_suffix('s')
                    .and_then(|n| n.parse::<u32>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| PolicyParseError(other.to_owned()))?;
                Ok(Self::Rolling { seconds })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle of the streaming connection to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ConnectionState {
    /// No connection and no reconnect pending.
    #[default]
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    /// The connection is up and delivering frames.
    Open,
    /// The connection dropped; waiting out the fixed backoff.
    ReconnectWait,
}

impl core::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ReconnectWait => "reconnect_wait",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Viewport transitions
// ---------------------------------------------------------------------------

/// How the renderer should move the map to a new focal point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum TransitionKind {
    /// Jump straight to the target.
    Snap,
    /// Animated pan and zoom.
    Fly {
        /// Animation length in milliseconds.
        duration_ms: u32,
    },
}
