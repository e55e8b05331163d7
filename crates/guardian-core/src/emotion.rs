//! Emotion vector and the decay/delta/clamp update rules.
//!
//! The engine is a pure transformer: it takes the previous vector and a
//! [`ResourceSample`] and returns the next vector. The order is fixed:
//! decay, then the load-driven delta, then a final clamp to [0, 1].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EmotionConfig;
use crate::types::ResourceSample;

// ── Emotion names ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happiness,
    Curiosity,
    Stress,
    Anxiety,
    Confidence,
    Frustration,
    Fear,
    Calm,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Happiness,
        Emotion::Curiosity,
        Emotion::Stress,
        Emotion::Anxiety,
        Emotion::Confidence,
        Emotion::Frustration,
        Emotion::Fear,
        Emotion::Calm,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn baseline(self) -> f64 {
        match self {
            Emotion::Happiness => 0.5,
            Emotion::Curiosity => 0.6,
            Emotion::Stress => 0.2,
            Emotion::Anxiety => 0.1,
            Emotion::Confidence => 0.5,
            Emotion::Frustration => 0.0,
            Emotion::Fear => 0.0,
            Emotion::Calm => 0.5,
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Emotion::Happiness => "happiness",
            Emotion::Curiosity => "curiosity",
            Emotion::Stress => "stress",
            Emotion::Anxiety => "anxiety",
            Emotion::Confidence => "confidence",
            Emotion::Frustration => "frustration",
            Emotion::Fear => "fear",
            Emotion::Calm => "calm",
        };
        write!(f, "{}", name)
    }
}

// ── Vector ──

/// One value per [`Emotion`], each within [0, 1]. The key set is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Emotion, f64>", into = "BTreeMap<Emotion, f64>")]
pub struct EmotionVector {
    values: [f64; 8],
}

impl Default for EmotionVector {
    fn default() -> Self {
        let mut values = [0.0; 8];
        for e in Emotion::ALL {
            values[e.index()] = e.baseline();
        }
        Self { values }
    }
}

impl EmotionVector {
    /// All emotions at zero.
    pub fn zeroed() -> Self {
        Self { values: [0.0; 8] }
    }

    pub fn get(&self, emotion: Emotion) -> f64 {
        self.values[emotion.index()]
    }

    pub fn set(&mut self, emotion: Emotion, value: f64) {
        self.values[emotion.index()] = clamp_unit(value);
    }

    /// Add `delta` and clamp.
    pub fn nudge(&mut self, emotion: Emotion, delta: f64) {
        let v = self.get(emotion) + delta;
        self.set(emotion, v);
    }

    /// Subtract `amount` from every value, flooring at zero. Never increases a value.
    pub fn decay(&mut self, amount: f64) {
        let amount = amount.max(0.0);
        for v in self.values.iter_mut() {
            *v = (*v - amount).max(0.0);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().map(move |e| (*e, self.get(*e)))
    }

    fn shift(&mut self, emotion: Emotion, delta: f64) {
        self.values[emotion.index()] += delta;
    }

    fn clamp(&mut self) {
        for v in self.values.iter_mut() {
            *v = clamp_unit(*v);
        }
    }
}

impl From<BTreeMap<Emotion, f64>> for EmotionVector {
    fn from(map: BTreeMap<Emotion, f64>) -> Self {
        let mut vector = EmotionVector::default();
        for (emotion, value) in map {
            vector.set(emotion, value);
        }
        vector
    }
}

impl From<EmotionVector> for BTreeMap<Emotion, f64> {
    fn from(vector: EmotionVector) -> Self {
        vector.iter().collect()
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

// ── Engine ──

/// Which delta branch a sample falls into. Evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadCondition {
    Overloaded,
    LowBattery,
    Nominal,
}

impl std::fmt::Display for LoadCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadCondition::Overloaded => write!(f, "overloaded"),
            LoadCondition::LowBattery => write!(f, "low battery"),
            LoadCondition::Nominal => write!(f, "nominal"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmotionEngine {
    config: EmotionConfig,
}

impl EmotionEngine {
    pub fn new(config: EmotionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmotionConfig {
        &self.config
    }

    pub fn classify(&self, sample: &ResourceSample) -> LoadCondition {
        if sample.ram_percent > self.config.overload_percent
            || sample.cpu_percent > self.config.overload_percent
        {
            LoadCondition::Overloaded
        } else if sample.battery_percent < self.config.low_battery_percent {
            LoadCondition::LowBattery
        } else {
            LoadCondition::Nominal
        }
    }

    /// Decay by elapsed time, apply the load delta, clamp.
    pub fn apply(
        &self,
        vector: &EmotionVector,
        sample: &ResourceSample,
        elapsed_seconds: f64,
    ) -> EmotionVector {
        let mut next = vector.clone();
        next.decay(self.config.decay_rate * elapsed_seconds.max(0.0));

        match self.classify(sample) {
            LoadCondition::Overloaded => {
                next.shift(Emotion::Stress, self.config.overload_step);
                next.shift(Emotion::Happiness, -self.config.overload_step);
            }
            LoadCondition::LowBattery => {
                next.shift(Emotion::Anxiety, self.config.low_battery_step);
                next.shift(Emotion::Confidence, -self.config.low_battery_step);
            }
            LoadCondition::Nominal => {
                next.shift(Emotion::Happiness, self.config.recovery_step);
            }
        }

        next.clamp();
        next
    }

    /// Energy limit for this cycle, from the same three-way branch as [`apply`](Self::apply).
    pub fn energy_limit(&self, previous: f64, sample: &ResourceSample) -> f64 {
        let next = match self.classify(sample) {
            LoadCondition::Overloaded => self.config.overload_energy,
            LoadCondition::LowBattery => self.config.low_battery_energy,
            LoadCondition::Nominal => (previous * self.config.energy_recovery).min(1.0),
        };
        clamp_unit(next)
    }
}
