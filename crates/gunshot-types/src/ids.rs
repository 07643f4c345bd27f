//! Identifier newtypes for sensors and gunshot events.
//!
//! Keeping identities in distinct types stops a microphone id from being
//! compared against an event id by accident.

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

/// Stable identity of an acoustic sensor (microphone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MicId(pub u32);

impl core::fmt::Display for MicId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MicId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identity of a gunshot event, unique within a session.
///
/// Backend versions disagree on whether the id is a JSON number or a
/// string. Both deserialize into the same canonical string form, so an
/// event keeps its identity across feeds. It always serializes as a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventId(String);

impl EventId {
    /// Create an event id from its canonical string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EventId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Unsigned(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}
