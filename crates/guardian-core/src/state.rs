//! The state store — every piece of mutable guardian state, its bounds, and
//! its JSON persistence.
//!
//! The store itself is not synchronized; the guardian wraps it in a single
//! `tokio::sync::Mutex` (see [`SharedState`]) so the background loop and the
//! request handler never interleave a read-modify-write.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::Config;
use crate::emotion::EmotionVector;
use crate::error::{GuardianError, Result};
use crate::types::*;

pub const REFLECTION_CAPACITY: usize = 100;
pub const LEARNING_CAPACITY: usize = 100;

pub type SharedState = Arc<tokio::sync::Mutex<StateStore>>;

/// Size bounds for the store's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub memory: usize,
    pub persisted_memory: usize,
    pub resource_history: usize,
    pub recursion_wrap: u32,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            memory: 1000,
            persisted_memory: 100,
            resource_history: 20,
            recursion_wrap: 100,
        }
    }
}

impl From<&Config> for StoreLimits {
    fn from(config: &Config) -> Self {
        Self {
            memory: config.memory_capacity,
            persisted_memory: config.persisted_memory,
            resource_history: config.resource_history_capacity,
            recursion_wrap: config.recursion_wrap,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    emotions: EmotionVector,
    energy_limit: f64,
    memory: VecDeque<String>,
    knowledge: KnowledgeMap,
    resource_history: VecDeque<ResourceSample>,
    reflections: VecDeque<ReflectionNote>,
    learning_history: VecDeque<LearningRecord>,
    perception: Perception,
    recursion_count: u32,
    last_update: DateTime<Utc>,
    limits: StoreLimits,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StoreLimits::default())
    }
}

impl StateStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            emotions: EmotionVector::default(),
            energy_limit: 1.0,
            memory: VecDeque::new(),
            knowledge: KnowledgeMap::new(),
            resource_history: VecDeque::new(),
            reflections: VecDeque::new(),
            learning_history: VecDeque::new(),
            perception: Perception {
                battery_level: 100.0,
                ..Perception::default()
            },
            recursion_count: 0,
            last_update: Utc::now(),
            limits,
        }
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    // ── Emotions & energy ──

    pub fn emotions(&self) -> &EmotionVector {
        &self.emotions
    }

    pub fn emotions_mut(&mut self) -> &mut EmotionVector {
        &mut self.emotions
    }

    pub fn energy_limit(&self) -> f64 {
        self.energy_limit
    }

    pub fn set_energy_limit(&mut self, value: f64) {
        self.energy_limit = value.clamp(0.0, 1.0);
    }

    /// Seconds since the last emotion update, then resets the clock to `now`.
    pub fn take_elapsed(&mut self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.last_update).num_milliseconds().max(0) as f64 / 1000.0;
        self.last_update = now;
        elapsed
    }

    // ── Histories ──

    /// Store the cycle's emotion snapshot and append the sample to the resource history.
    pub fn record(&mut self, sample: ResourceSample, emotions: EmotionVector) {
        self.emotions = emotions;
        self.perception.cpu_load = sample.cpu_percent;
        self.perception.ram_usage = sample.ram_percent;
        self.perception.battery_level = sample.battery_percent;
        push_bounded(&mut self.resource_history, sample, self.limits.resource_history);
    }

    pub fn resource_history(&self) -> &VecDeque<ResourceSample> {
        &self.resource_history
    }

    pub fn remember(&mut self, entry: impl Into<String>) {
        push_bounded(&mut self.memory, entry.into(), self.limits.memory);
    }

    pub fn memory(&self) -> &VecDeque<String> {
        &self.memory
    }

    pub fn note_reflection(&mut self, note: ReflectionNote) {
        push_bounded(&mut self.reflections, note, REFLECTION_CAPACITY);
    }

    pub fn reflections(&self) -> &VecDeque<ReflectionNote> {
        &self.reflections
    }

    // ── Knowledge ──

    /// Insert or overwrite a topic.
    pub fn learn(&mut self, topic: impl Into<String>, content: impl Into<String>) {
        self.knowledge.insert(
            topic.into(),
            KnowledgeEntry {
                content: content.into(),
                learned_at: Utc::now(),
            },
        );
    }

    pub fn knowledge(&self) -> &KnowledgeMap {
        &self.knowledge
    }

    pub fn record_learning(&mut self, topic: impl Into<String>, success: bool) -> LearningRecord {
        let record = LearningRecord {
            topic: topic.into(),
            success,
            timestamp: Utc::now(),
        };
        push_bounded(&mut self.learning_history, record.clone(), LEARNING_CAPACITY);
        record
    }

    pub fn learning_history(&self) -> &VecDeque<LearningRecord> {
        &self.learning_history
    }

    // ── Perception ──

    pub fn perception(&self) -> &Perception {
        &self.perception
    }

    pub fn set_senses(&mut self, visual_activity: bool, audio_detected: bool) {
        self.perception.visual_activity = visual_activity;
        self.perception.audio_detected = audio_detected;
    }

    // ── Recursion counter ──

    pub fn recursion_count(&self) -> u32 {
        self.recursion_count
    }

    /// Increment, wrapping from the configured bound back to 1.
    pub fn advance_recursion(&mut self) -> u32 {
        self.recursion_count = if self.recursion_count >= self.limits.recursion_wrap {
            1
        } else {
            self.recursion_count + 1
        };
        self.recursion_count
    }

    // ── Persistence ──

    /// The durable view: bounded tails plus the full knowledge map.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            memory: tail(&self.memory, self.limits.persisted_memory),
            knowledge_base: self.knowledge.clone(),
            resource_history: tail(&self.resource_history, self.limits.resource_history),
            learning_history: tail(&self.learning_history, LEARNING_CAPACITY),
            recursion_count: self.recursion_count,
            emotions: self.emotions.clone(),
            energy_limit: self.energy_limit,
            timestamp: Utc::now(),
        }
    }

    /// Replace the in-memory state with a snapshot, enforcing the current bounds.
    pub fn restore(&mut self, state: PersistedState) {
        self.memory.clear();
        for entry in state.memory {
            self.remember(entry);
        }
        self.knowledge = state.knowledge_base;
        self.resource_history.clear();
        for sample in state.resource_history {
            push_bounded(&mut self.resource_history, sample, self.limits.resource_history);
        }
        if let Some(latest) = self.resource_history.back() {
            self.perception.cpu_load = latest.cpu_percent;
            self.perception.ram_usage = latest.ram_percent;
            self.perception.battery_level = latest.battery_percent;
        }
        self.learning_history.clear();
        for record in state.learning_history {
            push_bounded(&mut self.learning_history, record, LEARNING_CAPACITY);
        }
        self.recursion_count = state.recursion_count.min(self.limits.recursion_wrap);
        self.emotions = state.emotions;
        self.set_energy_limit(state.energy_limit);
        self.last_update = Utc::now();
    }

    /// Write the snapshot as one JSON document, replacing the file whole.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_snapshot(path, &self.snapshot())
    }

    /// Load a saved snapshot. A missing file is not an error and leaves the store untouched.
    /// Returns whether a snapshot was restored.
    pub fn load(&mut self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            info!("No saved state at {}, starting fresh", path.display());
            return Ok(false);
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| GuardianError::persistence(path, e))?;
        let state: PersistedState = serde_json::from_str(&content)?;
        info!(
            "Loaded state: {} memories, {} topics, recursion {}",
            state.memory.len(),
            state.knowledge_base.len(),
            state.recursion_count
        );
        self.restore(state);
        Ok(true)
    }
}

/// Write a snapshot next to `path` and rename it into place. Blocking.
pub fn write_snapshot(path: &Path, state: &PersistedState) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| GuardianError::persistence(dir, e))?;
        }
    }

    let json = serde_json::to_string_pretty(state)?;
    let tmp = temp_path(path);
    std::fs::write(&tmp, json).map_err(|e| GuardianError::persistence(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| GuardianError::persistence(path, e))?;

    debug!("Saved state to {}", path.display());
    Ok(())
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    buf.push_back(item);
    while buf.len() > cap {
        buf.pop_front();
    }
}

fn tail<T: Clone>(buf: &VecDeque<T>, n: usize) -> Vec<T> {
    buf.iter().skip(buf.len().saturating_sub(n)).cloned().collect()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
