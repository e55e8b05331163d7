//! GuardianEvent enum — broadcast from the guardian to frontends via tokio::broadcast.

use serde::{Deserialize, Serialize};

use crate::dream::{Dream, Reflection};
use crate::types::{CycleReport, LearningRecord};

/// Events broadcast to all subscribers (the REPL, tests, any future UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GuardianEvent {
    /// One update cycle finished
    #[serde(rename = "cycle")]
    Cycle(CycleReport),

    /// A memory was replayed
    #[serde(rename = "dream")]
    Dream(Dream),

    /// A standalone reflection (dreams carry their own)
    #[serde(rename = "reflection")]
    Reflection(Reflection),

    /// A knowledge lookup finished, successfully or not
    #[serde(rename = "learned")]
    Learned(LearningRecord),

    /// State was written to disk
    #[serde(rename = "saved")]
    Saved { path: String },
}

impl GuardianEvent {
    /// `{"event": "...", "data": {...}}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Whether the event signals emotional instability.
    pub fn is_instability(&self) -> bool {
        match self {
            GuardianEvent::Dream(d) => d.reflection.unstable,
            GuardianEvent::Reflection(r) => r.unstable,
            _ => false,
        }
    }
}
