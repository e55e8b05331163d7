//! Core types — ResourceSample, KnowledgeEntry, ReflectionNote, PersistedState, etc.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::{EmotionVector, LoadCondition};

// ── Host metrics ──

/// One reading of the host. Percentages are clamped to [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    #[serde(rename = "ram")]
    pub ram_percent: f64,
    #[serde(rename = "battery")]
    pub battery_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl ResourceSample {
    pub fn new(cpu_percent: f64, ram_percent: f64, battery_percent: f64) -> Self {
        Self::at(cpu_percent, ram_percent, battery_percent, Utc::now())
    }

    pub fn at(
        cpu_percent: f64,
        ram_percent: f64,
        battery_percent: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            cpu_percent: clamp_percent(cpu_percent),
            ram_percent: clamp_percent(ram_percent),
            battery_percent: clamp_battery(battery_percent),
            timestamp,
        }
    }
}

fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// A battery reading that is not a number reads as full, never as drained.
fn clamp_battery(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        100.0
    }
}

// ── Perception ──

/// What the guardian last perceived, from metrics and the optional senses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    pub cpu_load: f64,
    pub ram_usage: f64,
    pub battery_level: f64,
    pub visual_activity: bool,
    pub audio_detected: bool,
}

// ── Knowledge ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub content: String,
    pub learned_at: DateTime<Utc>,
}

/// Topic → entry. Ordered so the persisted document is deterministic.
pub type KnowledgeMap = BTreeMap<String, KnowledgeEntry>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub topic: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

// ── Reflection ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionNote {
    pub timestamp: DateTime<Utc>,
    pub anxiety: f64,
    pub fear: f64,
}

// ── Cycle report ──

/// Who ran a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleSource {
    Background,
    Request,
}

/// Summary of one update cycle, broadcast to frontends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub source: CycleSource,
    pub recursion_count: u32,
    pub energy_limit: f64,
    pub condition: LoadCondition,
    pub sample: ResourceSample,
}

// ── Persisted state ──

fn default_energy_limit() -> f64 {
    1.0
}

/// The durable snapshot written to the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub memory: Vec<String>,
    #[serde(default)]
    pub knowledge_base: KnowledgeMap,
    #[serde(default)]
    pub resource_history: Vec<ResourceSample>,
    #[serde(default)]
    pub learning_history: Vec<LearningRecord>,
    #[serde(default)]
    pub recursion_count: u32,
    #[serde(default)]
    pub emotions: EmotionVector,
    #[serde(default = "default_energy_limit")]
    pub energy_limit: f64,
    pub timestamp: DateTime<Utc>,
}
